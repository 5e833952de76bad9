use crate::errors::{AppError, AppResult};
use crate::placement::Placement;
use crate::rank::Rank;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::{NoContext, Timestamp, Uuid};

pub const NAMESPACE: &str = "daybook";
pub const CURRENT_SCHEMA_VERSION: u32 = 3;
pub const EDGE_SCHEMA: &str = "daybook.edge/1";
pub const ALIAS_SCHEMA: &str = "daybook.alias/1";
pub const WORKSPACE_SCHEMA: &str = "daybook.workspace/1";

static ITEM_SCHEMA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9_-]+)\.item\.frontmatter/([0-9]+)$").expect("valid regex"));

pub fn item_schema(version: u32) -> String {
    format!("{}.item.frontmatter/{}", NAMESPACE, version)
}

/// Version encoded in an item `schema` tag, if the tag belongs to this namespace.
pub fn parse_item_schema(tag: &str) -> Option<u32> {
    let captures = ITEM_SCHEMA_PATTERN.captures(tag.trim())?;
    if &captures[1] != NAMESPACE {
        return None;
    }
    captures[2].parse().ok()
}

/// Timestamp-ordered item identifier (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let seconds = u64::try_from(at.timestamp()).unwrap_or(0);
        let timestamp = Timestamp::from_unix(NoContext, seconds, at.timestamp_subsec_nanos());
        Self(Uuid::new_v7(timestamp))
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        let uuid = Uuid::parse_str(value.trim())
            .map_err(|error| AppError::Invalid(format!("invalid item id '{}': {}", value, error)))?;
        if uuid.get_version_num() != 7 {
            return Err(AppError::Invalid(format!(
                "invalid item id '{}': expected a version 7 uuid",
                value
            )));
        }
        Ok(Self(uuid))
    }

    pub fn is_valid(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    /// Creation instant embedded in the id.
    pub fn created_at(&self) -> DateTime<Utc> {
        let (seconds, nanos) = self
            .0
            .get_timestamp()
            .map(|timestamp| timestamp.to_unix())
            .unwrap_or((0, 0));
        Utc.timestamp_opt(seconds as i64, nanos)
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ItemId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ItemId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Note,
    Task,
    Event,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Task => "task",
            Self::Event => "event",
        }
    }
}

/// Frontmatter of an item at the current schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFrontmatter {
    pub schema: String,
    pub id: ItemId,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub placement: Placement,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub frontmatter: ItemFrontmatter,
    pub body: String,
}

impl ItemRecord {
    pub fn new(
        id: ItemId,
        kind: ItemKind,
        title: Option<String>,
        placement: Placement,
        rank: Rank,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            frontmatter: ItemFrontmatter {
                schema: item_schema(CURRENT_SCHEMA_VERSION),
                id,
                kind,
                title,
                placement,
                rank,
                alias: None,
                project: None,
                contexts: Vec::new(),
                created_at: now,
                updated_at: now,
                extra: Map::new(),
            },
            body: String::new(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.frontmatter.id
    }

    pub fn placement(&self) -> &Placement {
        &self.frontmatter.placement
    }

    pub fn rank(&self) -> &Rank {
        &self.frontmatter.rank
    }
}

/// Ordering record linking one placement bucket to one child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub to: ItemId,
    pub rank: Rank,
    pub from: Option<ItemId>,
}

impl Edge {
    pub fn new(to: ItemId, rank: Rank) -> Self {
        Self { to, rank, from: None }
    }

    pub fn with_parent(mut self, parent: ItemId) -> Self {
        self.from = Some(parent);
        self
    }
}
