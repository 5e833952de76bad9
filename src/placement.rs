use crate::errors::{AppError, AppResult};
use crate::models::ItemId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PERMANENT: &str = "permanent";
const DATE_FORMAT: &str = "%Y-%m-%d";
const SECTION_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlacementHead {
    Date(NaiveDate),
    Parent(ItemId),
    Permanent,
}

impl PlacementHead {
    fn parse(value: &str) -> AppResult<Self> {
        if value == PERMANENT {
            return Ok(Self::Permanent);
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
            if date.format(DATE_FORMAT).to_string() == value {
                return Ok(Self::Date(date));
            }
        }
        ItemId::parse(value)
            .map(Self::Parent)
            .map_err(|_| AppError::Invalid(format!("invalid placement head '{}'", value)))
    }

    /// Bucket root relative to `.index/graph`.
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Self::Date(date) => Path::new("dates").join(date.format(DATE_FORMAT).to_string()),
            Self::Parent(parent) => Path::new("parents").join(parent.to_string()),
            Self::Permanent => PathBuf::from(PERMANENT),
        }
    }
}

impl fmt::Display for PlacementHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Self::Parent(parent) => write!(f, "{}", parent),
            Self::Permanent => f.write_str(PERMANENT),
        }
    }
}

/// Hierarchical address of an item: a head plus a numeric section path.
///
/// Orders dates chronologically before parents before the permanent bucket,
/// then by section path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Placement {
    head: PlacementHead,
    section: Vec<u32>,
}

impl Placement {
    pub fn new(head: PlacementHead, section: Vec<u32>) -> AppResult<Self> {
        if let Some(zero) = section.iter().position(|segment| *segment == 0) {
            return Err(AppError::Invalid(format!(
                "section segment {} of placement under '{}' must be positive",
                zero + 1,
                head
            )));
        }
        Ok(Self { head, section })
    }

    pub fn date(date: NaiveDate) -> Self {
        Self {
            head: PlacementHead::Date(date),
            section: Vec::new(),
        }
    }

    pub fn parent(parent: ItemId) -> Self {
        Self {
            head: PlacementHead::Parent(parent),
            section: Vec::new(),
        }
    }

    pub fn permanent() -> Self {
        Self {
            head: PlacementHead::Permanent,
            section: Vec::new(),
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim().trim_end_matches('/');
        let mut segments = trimmed.split('/');
        let head = PlacementHead::parse(segments.next().unwrap_or_default())?;
        let section = segments
            .map(|segment| {
                parse_section_segment(segment).ok_or_else(|| {
                    AppError::Invalid(format!(
                        "invalid section segment '{}' in placement '{}'",
                        segment, value
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(head, section)
    }

    pub fn head(&self) -> &PlacementHead {
        &self.head
    }

    pub fn section(&self) -> &[u32] {
        &self.section
    }

    pub fn parent_id(&self) -> Option<ItemId> {
        match self.head {
            PlacementHead::Parent(parent) => Some(parent),
            _ => None,
        }
    }

    pub fn child_section(&self, segment: u32) -> AppResult<Self> {
        let mut section = self.section.clone();
        section.push(segment);
        Self::new(self.head, section)
    }

    /// Bucket directory relative to `.index/graph`.
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = self.head.relative_dir();
        for segment in &self.section {
            dir.push(section_dir_name(*segment));
        }
        dir
    }

    /// Inverse of [`Placement::relative_dir`] for the components of an index path.
    pub fn from_relative_components(components: &[&str]) -> Option<Self> {
        let (head, rest) = match components {
            ["dates", date, rest @ ..] => {
                let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
                (PlacementHead::Date(parsed), rest)
            }
            ["parents", parent, rest @ ..] => (PlacementHead::Parent(ItemId::parse(parent).ok()?), rest),
            [PERMANENT, rest @ ..] => (PlacementHead::Permanent, rest),
            _ => return None,
        };
        let section = rest
            .iter()
            .map(|segment| parse_section_dir_name(segment))
            .collect::<Option<Vec<_>>>()?;
        Self::new(head, section).ok()
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for segment in &self.section {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Placement {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Placement {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        value.to_string()
    }
}

fn parse_section_segment(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    segment.parse::<u32>().ok().filter(|value| *value > 0)
}

pub fn section_dir_name(segment: u32) -> String {
    format!("{:0width$}", segment, width = SECTION_WIDTH)
}

/// Accepts only zero-padded positive integers, as written by [`section_dir_name`].
pub fn parse_section_dir_name(name: &str) -> Option<u32> {
    if name.len() < SECTION_WIDTH {
        return None;
    }
    let value = parse_section_segment(name)?;
    (section_dir_name(value) == name).then_some(value)
}
