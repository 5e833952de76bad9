use crate::errors::{AppError, AppResult, RepositoryError, RepositoryOperation, RepositoryScope};
use crate::fsutil::{file_name_str, prune_empty_dirs, read_json_file, remove_file_if_exists, sorted_entries, write_json_file};
use crate::models::{ItemId, ALIAS_SCHEMA};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const ALIAS_FILE_SUFFIX: &str = ".alias.json";

/// Case, width and diacritic insensitive form of an alias slug.
pub fn canonicalize(raw: &str) -> String {
    let folded: String = raw.nfkc().collect::<String>().to_lowercase();
    folded
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn alias_hash(canonical_key: &str) -> String {
    hex::encode(Sha256::digest(canonical_key.as_bytes()))
}

/// `xx/<hash>.alias.json`, relative to `.index/aliases`.
pub fn alias_relative_path(slug: &str) -> PathBuf {
    hashed_relative_path(&alias_hash(&canonicalize(slug)))
}

fn hashed_relative_path(hash: &str) -> PathBuf {
    Path::new(&hash[..2]).join(format!("{}{}", hash, ALIAS_FILE_SUFFIX))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRecord {
    pub schema: String,
    pub raw: String,
    pub canonical_key: String,
    pub item_id: ItemId,
    pub created_at: DateTime<Utc>,
}

impl AliasRecord {
    pub fn new(raw: &str, item_id: ItemId, created_at: DateTime<Utc>) -> AppResult<Self> {
        let canonical_key = canonicalize(raw);
        if canonical_key.is_empty() {
            return Err(AppError::Invalid(format!("alias '{}' is empty after normalization", raw)));
        }
        Ok(Self {
            schema: ALIAS_SCHEMA.to_string(),
            raw: raw.to_string(),
            canonical_key,
            item_id,
            created_at,
        })
    }

    pub fn hash(&self) -> String {
        alias_hash(&self.canonical_key)
    }

    pub fn relative_path(&self) -> PathBuf {
        hashed_relative_path(&self.hash())
    }
}

#[derive(Debug, Clone)]
pub struct StoredAlias {
    pub path: PathBuf,
    pub record: AliasRecord,
}

#[derive(Debug, Clone, Default)]
pub struct AliasListing {
    pub aliases: Vec<StoredAlias>,
    pub failures: Vec<RepositoryError>,
}

/// Writes one alias file under an arbitrary aliases root (live or staging).
pub fn write_alias_file(aliases_root: &Path, record: &AliasRecord) -> AppResult<PathBuf> {
    let path = aliases_root.join(record.relative_path());
    write_json_file(RepositoryScope::Alias, &path, record)?;
    Ok(path)
}

pub struct AliasRepository<'a> {
    workspace: &'a Workspace,
}

impl<'a> AliasRepository<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.workspace.aliases_dir().join(alias_relative_path(slug))
    }

    /// Stores `record`, refusing when another item already owns its canonical key.
    pub fn save(&self, record: &AliasRecord) -> AppResult<()> {
        if let Some(existing) = self.load_by_slug(&record.canonical_key)? {
            if existing.item_id != record.item_id {
                return Err(AppError::Conflict(format!(
                    "alias '{}' already belongs to item {}",
                    record.raw, existing.item_id
                )));
            }
        }
        let path = write_alias_file(&self.workspace.aliases_dir(), record)?;
        tracing::debug!(path = %path.to_string_lossy(), item = %record.item_id, "saved alias");
        Ok(())
    }

    pub fn load_by_slug(&self, slug: &str) -> AppResult<Option<AliasRecord>> {
        if canonicalize(slug).is_empty() {
            return Ok(None);
        }
        let path = self.path_for(slug);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json_file(RepositoryScope::Alias, &path)?))
    }

    pub fn delete(&self, slug: &str) -> AppResult<bool> {
        if canonicalize(slug).is_empty() {
            return Ok(false);
        }
        let path = self.path_for(slug);
        let removed = remove_file_if_exists(&path)
            .map_err(RepositoryError::at(RepositoryScope::Alias, RepositoryOperation::Delete, &path))?;
        if let Some(parent) = path.parent() {
            prune_empty_dirs(parent, &self.workspace.aliases_dir())
                .map_err(RepositoryError::at(RepositoryScope::Alias, RepositoryOperation::Delete, parent))?;
        }
        Ok(removed)
    }

    /// Every alias file in shard then hash order. Unreadable files are reported, not fatal.
    pub fn list(&self) -> AppResult<AliasListing> {
        let root = self.workspace.aliases_dir();
        let mut listing = AliasListing::default();
        let shards = sorted_entries(&root)
            .map_err(RepositoryError::at(RepositoryScope::Alias, RepositoryOperation::List, &root))?;
        for shard in shards.into_iter().filter(|path| path.is_dir()) {
            let files = sorted_entries(&shard)
                .map_err(RepositoryError::at(RepositoryScope::Alias, RepositoryOperation::List, &shard))?;
            for path in files {
                if !file_name_str(&path).is_some_and(|name| name.ends_with(ALIAS_FILE_SUFFIX)) {
                    continue;
                }
                match read_json_file::<AliasRecord>(RepositoryScope::Alias, &path) {
                    Ok(record) => listing.aliases.push(StoredAlias { path, record }),
                    Err(error) => {
                        tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping malformed alias");
                        listing.failures.push(error);
                    }
                }
            }
        }
        Ok(listing)
    }
}
