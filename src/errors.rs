use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryScope {
    Workspace,
    Item,
    Edge,
    Alias,
    Index,
}

impl RepositoryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Item => "item",
            Self::Edge => "edge",
            Self::Alias => "alias",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for RepositoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    Read,
    Write,
    Delete,
    List,
    Parse,
    Serialize,
    Rename,
}

impl RepositoryOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Parse => "parse",
            Self::Serialize => "serialize",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("REPOSITORY_FAILURE: {scope}.{operation}{}{}", suffix(" ", .identifier), suffix(": ", .cause))]
pub struct RepositoryError {
    pub scope: RepositoryScope,
    pub operation: RepositoryOperation,
    pub identifier: Option<String>,
    pub cause: Option<String>,
}

fn suffix(separator: &str, value: &Option<String>) -> String {
    value
        .as_deref()
        .map(|value| format!("{}{}", separator, value))
        .unwrap_or_default()
}

impl RepositoryError {
    pub fn new(scope: RepositoryScope, operation: RepositoryOperation) -> Self {
        Self {
            scope,
            operation,
            identifier: None,
            cause: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_path(self, path: &Path) -> Self {
        self.with_identifier(path.to_string_lossy().to_string())
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Builds a `map_err` adapter for failures touching `path`.
    pub fn at<E: fmt::Display>(
        scope: RepositoryScope,
        operation: RepositoryOperation,
        path: &Path,
    ) -> impl FnOnce(E) -> RepositoryError + '_ {
        move |error| RepositoryError::new(scope, operation).with_path(path).with_cause(error)
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("invalid rank '{value}': {reason}")]
    InvalidFormat { value: String, reason: String },
    #[error("no rank exists between '{lower}' and '{upper}'")]
    NoRoom { lower: String, upper: String },
    #[error("ranks '{lower}' and '{upper}' belong to different buckets")]
    BucketMismatch { lower: String, upper: String },
    #[error("rank precision exhausted between '{lower}' and '{upper}'")]
    PrecisionExhausted { lower: String, upper: String },
}

impl RankError {
    /// True when the caller can recover by rebalancing the sibling group.
    pub fn needs_rebalance(&self) -> bool {
        matches!(self, Self::NoRoom { .. } | Self::PrecisionExhausted { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RebalanceError {
    #[error("rank_generation_failed: {placement}: {source}")]
    RankGenerationFailed {
        placement: String,
        #[source]
        source: RankError,
    },
    #[error("empty_group: {placement}")]
    EmptyGroup { placement: String },
}

impl RebalanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RankGenerationFailed { .. } => "rank_generation_failed",
            Self::EmptyGroup { .. } => "empty_group",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("write_error: {message}")]
pub struct WriteError {
    pub message: String,
    #[source]
    pub source: Option<RepositoryError>,
}

impl WriteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn code(&self) -> &'static str {
        "write_error"
    }
}

impl From<RepositoryError> for WriteError {
    fn from(value: RepositoryError) -> Self {
        Self {
            message: value.to_string(),
            source: Some(value),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {field}: {message}")]
pub struct MigrationItemError {
    pub path: String,
    pub field: String,
    pub token: Option<String>,
    pub message: String,
}

impl MigrationItemError {
    pub fn new(path: &Path, field: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            field: field.to_string(),
            token: None,
            message: message.into(),
        }
    }

    pub fn unresolved(path: &Path, field: &str, token: &str) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            field: field.to_string(),
            token: Some(token.to_string()),
            message: format!("unresolved reference '{}'", token),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("INVALID_INPUT: {0}")]
    Invalid(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("MIGRATION_REQUIRED: workspace is at version {current}, commands need version {expected}")]
    MigrationRequired { current: u32, expected: u32 },
    #[error("UNSUPPORTED_VERSION: workspace version {current} is newer than supported version {supported}")]
    UnsupportedVersion { current: u32, supported: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("RANK_FAILURE: {0}")]
    Rank(#[from] RankError),
    #[error("REBALANCE_FAILURE: {0}")]
    Rebalance(#[from] RebalanceError),
    #[error("INDEX_WRITE_FAILURE: {0}")]
    Write(#[from] WriteError),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
