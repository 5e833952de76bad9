mod workflow;

pub use workflow::{create_item, delete_item, move_item, reorder_item, NewItem, Position};

use crate::edges::EdgeStore;
use crate::errors::{AppError, AppResult, RepositoryError, RepositoryOperation, RepositoryResult, RepositoryScope};
use crate::fsutil::{atomic_write, file_name_str, prune_empty_dirs, remove_file_if_exists, sorted_entries};
use crate::models::{item_schema, ItemId, ItemRecord, CURRENT_SCHEMA_VERSION};
use crate::placement::Placement;
use crate::record::{decode_item, encode_item, parse_document, render_document, RecordDocument};
use crate::workspace::Workspace;
use std::fs;
use std::path::{Path, PathBuf};

pub const ITEM_FILE_EXTENSION: &str = "md";

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub path: PathBuf,
    pub record: ItemRecord,
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub path: PathBuf,
    pub document: RecordDocument,
}

#[derive(Debug, Clone, Default)]
pub struct ItemListing {
    pub items: Vec<StoredItem>,
    pub failures: Vec<RepositoryError>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentListing {
    pub documents: Vec<StoredDocument>,
    pub failures: Vec<RepositoryError>,
}

/// Primary item records under `items/YYYY/MM/DD/<id>.md`.
pub struct ItemRepository<'a> {
    workspace: &'a Workspace,
}

impl<'a> ItemRepository<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Fixed location derived from the id's timestamp in the workspace time zone.
    pub fn item_path(&self, id: ItemId) -> PathBuf {
        let date = self.workspace.local_date(id.created_at());
        self.workspace
            .items_dir()
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string())
            .join(format!("{}.{}", id, ITEM_FILE_EXTENSION))
    }

    pub fn exists(&self, id: ItemId) -> bool {
        self.item_path(id).is_file()
    }

    pub fn load(&self, id: ItemId) -> AppResult<ItemRecord> {
        let path = self.item_path(id);
        if !path.is_file() {
            return Err(AppError::NotFound(format!("item {} not found", id)));
        }
        Ok(self.load_path(&path)?)
    }

    pub fn load_path(&self, path: &Path) -> RepositoryResult<ItemRecord> {
        let document = self.read_document(path)?;
        if document.schema_version() != Some(CURRENT_SCHEMA_VERSION) {
            return Err(RepositoryError::new(RepositoryScope::Item, RepositoryOperation::Parse)
                .with_path(path)
                .with_cause(format!(
                    "expected schema '{}', found {}",
                    item_schema(CURRENT_SCHEMA_VERSION),
                    document.string_field("schema").unwrap_or("no schema")
                )));
        }
        decode_item(&document).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Parse, path))
    }

    pub fn read_document(&self, path: &Path) -> RepositoryResult<RecordDocument> {
        let content =
            fs::read_to_string(path).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Read, path))?;
        parse_document(&content).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Parse, path))
    }

    pub fn write_document(&self, path: &Path, document: &RecordDocument) -> RepositoryResult<()> {
        let rendered =
            render_document(document).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Serialize, path))?;
        atomic_write(path, rendered.as_bytes()).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Write, path))
    }

    pub fn save(&self, record: &ItemRecord) -> RepositoryResult<PathBuf> {
        let path = self.item_path(record.id());
        let document =
            encode_item(record).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Serialize, &path))?;
        self.write_document(&path, &document)?;
        tracing::debug!(path = %path.to_string_lossy(), item = %record.id(), "saved item");
        Ok(path)
    }

    pub fn delete(&self, id: ItemId) -> RepositoryResult<bool> {
        let path = self.item_path(id);
        let removed = remove_file_if_exists(&path)
            .map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Delete, &path))?;
        if let Some(parent) = path.parent() {
            prune_empty_dirs(parent, &self.workspace.items_dir())
                .map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::Delete, parent))?;
        }
        Ok(removed)
    }

    /// Every `.md` file under `items/`, in path order.
    pub fn item_files(&self) -> RepositoryResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_item_files(&self.workspace.items_dir(), &mut files)?;
        Ok(files)
    }

    /// Raw documents at any schema version; used by migration.
    pub fn list_documents(&self) -> RepositoryResult<DocumentListing> {
        let mut listing = DocumentListing::default();
        for path in self.item_files()? {
            match self.read_document(&path) {
                Ok(document) => listing.documents.push(StoredDocument { path, document }),
                Err(error) => {
                    tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping malformed item file");
                    listing.failures.push(error);
                }
            }
        }
        Ok(listing)
    }

    /// Current-version records; files that fail to parse are reported separately.
    pub fn list_all(&self) -> RepositoryResult<ItemListing> {
        let mut listing = ItemListing::default();
        for path in self.item_files()? {
            match self.load_path(&path) {
                Ok(record) => listing.items.push(StoredItem { path, record }),
                Err(error) => {
                    tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping malformed item file");
                    listing.failures.push(error);
                }
            }
        }
        tracing::debug!(items = listing.items.len(), failures = listing.failures.len(), "listed items");
        Ok(listing)
    }

    /// Items of one bucket in sibling order, resolved through the edge index.
    pub fn list_by_placement(&self, placement: &Placement) -> AppResult<Vec<ItemRecord>> {
        let edges = EdgeStore::for_workspace(self.workspace).ordered_children(placement)?;
        let mut records = Vec::with_capacity(edges.len());
        for edge in edges {
            match self.load(edge.to) {
                Ok(record) => records.push(record),
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(bucket = %placement, item = %edge.to, "edge points at a missing item");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(records)
    }
}

fn collect_item_files(dir: &Path, files: &mut Vec<PathBuf>) -> RepositoryResult<()> {
    let entries =
        sorted_entries(dir).map_err(RepositoryError::at(RepositoryScope::Item, RepositoryOperation::List, dir))?;
    for path in entries {
        if path.is_dir() {
            collect_item_files(&path, files)?;
        } else if path.extension().and_then(|value| value.to_str()) == Some(ITEM_FILE_EXTENSION)
            && !file_name_str(&path).is_some_and(|name| name.starts_with('.'))
        {
            files.push(path);
        }
    }
    Ok(())
}
