use super::rebuild::IndexSnapshot;
use crate::aliases::write_alias_file;
use crate::edges::EdgeStore;
use crate::errors::{RepositoryError, RepositoryOperation, RepositoryScope, WriteError};
use crate::fsutil::remove_dir_if_exists;
use crate::workspace::{ensure_topology, Workspace, ALIASES_DIR, GRAPH_DIR};
use std::fs;
use std::path::Path;

/// Two-phase index persistence: stage under `.index/.rebuild`, then swap into place.
pub struct IndexWriter<'a> {
    workspace: &'a Workspace,
}

impl<'a> IndexWriter<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    pub fn stage(&self, snapshot: &IndexSnapshot) -> Result<(), WriteError> {
        let staging = self.workspace.rebuild_dir();
        remove_dir_if_exists(&staging)
            .map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Delete, &staging))?;
        fs::create_dir_all(&staging)
            .map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Write, &staging))?;

        let store = EdgeStore::new(staging.join(GRAPH_DIR));
        for (head, tree) in snapshot.trees() {
            store.write_tree(&head, &tree)?;
        }
        let aliases_root = staging.join(ALIASES_DIR);
        for record in snapshot.aliases.values() {
            write_alias_file(&aliases_root, record).map_err(|error| WriteError::new(error.to_string()))?;
        }
        tracing::debug!(
            staging = %staging.to_string_lossy(),
            edges = snapshot.edge_count(),
            aliases = snapshot.aliases.len(),
            "staged index"
        );
        Ok(())
    }

    /// Replaces the live `graph/` and `aliases/` with the staged copies.
    pub fn replace(&self) -> Result<(), WriteError> {
        let staging = self.workspace.rebuild_dir();
        if !staging.is_dir() {
            return Err(WriteError::new("no staged index to replace the live index with"));
        }
        for (name, live) in [
            (GRAPH_DIR, self.workspace.graph_dir()),
            (ALIASES_DIR, self.workspace.aliases_dir()),
        ] {
            swap_in(&staging.join(name), &live)?;
        }
        remove_dir_if_exists(&staging)
            .map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Delete, &staging))?;
        ensure_topology(self.workspace.root()).map_err(|error| WriteError::new(error.to_string()))?;
        tracing::info!(index = %self.workspace.index_dir().to_string_lossy(), "replaced live index");
        Ok(())
    }

    pub fn write(&self, snapshot: &IndexSnapshot) -> Result<(), WriteError> {
        self.stage(snapshot)?;
        self.replace()
    }
}

fn swap_in(staged: &Path, live: &Path) -> Result<(), WriteError> {
    remove_dir_if_exists(live).map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Delete, live))?;
    if staged.is_dir() {
        fs::rename(staged, live).map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Rename, staged))?;
    } else {
        fs::create_dir_all(live).map_err(RepositoryError::at(RepositoryScope::Index, RepositoryOperation::Write, live))?;
    }
    Ok(())
}
