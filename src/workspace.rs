use crate::errors::{AppError, AppResult, RepositoryError, RepositoryOperation, RepositoryScope};
use crate::fsutil::{read_json_file, write_json_file};
use crate::models::{CURRENT_SCHEMA_VERSION, WORKSPACE_SCHEMA};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKSPACE_FILE: &str = "workspace.json";
pub const ITEMS_DIR: &str = "items";
pub const INDEX_DIR: &str = ".index";
pub const GRAPH_DIR: &str = "graph";
pub const ALIASES_DIR: &str = "aliases";
pub const REBUILD_DIR: &str = ".rebuild";

const ROOT_DIRS: &[&str] = &[
    "items",
    ".index/graph/dates",
    ".index/graph/parents",
    ".index/graph/permanent",
    ".index/aliases",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub schema: String,
    pub migration: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl WorkspaceConfig {
    pub fn new(timezone: &str) -> Self {
        Self {
            schema: WORKSPACE_SCHEMA.to_string(),
            migration: CURRENT_SCHEMA_VERSION,
            timezone: timezone.to_string(),
            extra: Map::new(),
        }
    }
}

pub fn parse_timezone(value: &str) -> AppResult<FixedOffset> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| AppError::Internal("zero offset".to_string()));
    }
    trimmed
        .parse::<FixedOffset>()
        .map_err(|error| AppError::Invalid(format!("invalid workspace timezone '{}': {}", value, error)))
}

/// An opened workspace root. Every core operation receives one explicitly.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    timezone: FixedOffset,
    config: WorkspaceConfig,
}

impl Workspace {
    /// Creates the topology and a current-version `workspace.json` unless one exists.
    pub fn init(root: &Path, timezone: &str) -> AppResult<Self> {
        ensure_topology(root)?;
        let config_path = root.join(WORKSPACE_FILE);
        if !config_path.exists() {
            parse_timezone(timezone)?;
            write_json_file(RepositoryScope::Workspace, &config_path, &WorkspaceConfig::new(timezone))?;
            tracing::info!(root = %root.to_string_lossy(), timezone, "initialized workspace");
        }
        Self::open(root)
    }

    pub fn open(root: &Path) -> AppResult<Self> {
        let config_path = root.join(WORKSPACE_FILE);
        if !config_path.exists() {
            return Err(AppError::NotFound(format!(
                "no {} found under {}",
                WORKSPACE_FILE,
                root.to_string_lossy()
            )));
        }
        let config: WorkspaceConfig = read_json_file(RepositoryScope::Workspace, &config_path)?;
        if config.schema != WORKSPACE_SCHEMA {
            return Err(AppError::Invalid(format!(
                "unsupported workspace schema '{}'",
                config.schema
            )));
        }
        let timezone = parse_timezone(&config.timezone)?;
        Ok(Self {
            root: root.to_path_buf(),
            timezone,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn migration_version(&self) -> u32 {
        self.config.migration
    }

    /// Gate for every command except `migrate`.
    pub fn ensure_current(&self) -> AppResult<()> {
        let current = self.config.migration;
        if current < CURRENT_SCHEMA_VERSION {
            return Err(AppError::MigrationRequired {
                current,
                expected: CURRENT_SCHEMA_VERSION,
            });
        }
        if current > CURRENT_SCHEMA_VERSION {
            return Err(AppError::UnsupportedVersion {
                current,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    pub fn set_migration_version(&mut self, version: u32) -> AppResult<()> {
        let mut config = self.config.clone();
        config.migration = version;
        write_json_file(RepositoryScope::Workspace, &self.root.join(WORKSPACE_FILE), &config)?;
        tracing::info!(from = self.config.migration, to = version, "recorded workspace migration version");
        self.config = config;
        Ok(())
    }

    pub fn items_dir(&self) -> PathBuf {
        self.root.join(ITEMS_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.index_dir().join(GRAPH_DIR)
    }

    pub fn aliases_dir(&self) -> PathBuf {
        self.index_dir().join(ALIASES_DIR)
    }

    pub fn rebuild_dir(&self) -> PathBuf {
        self.index_dir().join(REBUILD_DIR)
    }

    /// Calendar date of `instant` in the workspace time zone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

pub fn ensure_topology(root: &Path) -> AppResult<()> {
    for rel in ROOT_DIRS {
        let dir = root.join(rel);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|error| {
                RepositoryError::new(RepositoryScope::Workspace, RepositoryOperation::Write)
                    .with_path(&dir)
                    .with_cause(error)
            })?;
        }
    }
    Ok(())
}
