mod lexo;
mod service;

pub use lexo::{LexoRankGenerator, MAX_FRACTION_DIGITS};
pub use service::RankService;

use crate::errors::RankError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static RANK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-2])\|([0-9a-z]{6}):([0-9a-z]*)$").expect("valid regex"));

/// Sibling ordering key, `<bucket>|<integer>:<fraction>` in base 36.
///
/// Ordering is plain byte order of the canonical string, which coincides with
/// numeric order because the integer part is fixed width and the fraction
/// never carries trailing zeros.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rank(String);

impl Rank {
    pub fn parse(value: &str) -> Result<Self, RankError> {
        let trimmed = value.trim();
        let Some(captures) = RANK_PATTERN.captures(trimmed) else {
            return Err(RankError::InvalidFormat {
                value: value.to_string(),
                reason: "expected <bucket>|<6 base36 digits>:<base36 fraction>".to_string(),
            });
        };
        let bucket = &captures[1];
        let integer = &captures[2];
        let fraction = captures[3].trim_end_matches('0');
        Ok(Self(format!("{}|{}:{}", bucket, integer, fraction)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bucket(&self) -> u8 {
        self.0.as_bytes()[0] - b'0'
    }

    pub(crate) fn integer_part(&self) -> &str {
        &self.0[2..8]
    }

    pub(crate) fn fraction_part(&self) -> &str {
        &self.0[9..]
    }

    pub(crate) fn from_canonical(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Rank {
    type Err = RankError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Rank {
    type Error = RankError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rank> for String {
    fn from(value: Rank) -> Self {
        value.0
    }
}

/// A dense, totally ordered key space.
pub trait RankGenerator {
    fn min(&self) -> Rank;
    fn max(&self) -> Rank;
    fn middle(&self) -> Rank;
    /// Fails when nothing fits strictly between `lower` and `upper`.
    fn between(&self, lower: &Rank, upper: &Rank) -> Result<Rank, RankError>;
    fn next(&self, rank: &Rank) -> Result<Rank, RankError>;
    fn prev(&self, rank: &Rank) -> Result<Rank, RankError>;

    fn compare(&self, a: &Rank, b: &Rank) -> Ordering {
        a.as_str().as_bytes().cmp(b.as_str().as_bytes())
    }
}
