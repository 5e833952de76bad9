mod tree;

pub use tree::SectionTree;

use crate::errors::{RepositoryError, RepositoryOperation, RepositoryResult, RepositoryScope};
use crate::fsutil::{atomic_write, file_name_str, prune_empty_dirs, remove_dir_if_exists, remove_file_if_exists, sorted_entries};
use crate::models::{Edge, ItemId, EDGE_SCHEMA};
use crate::placement::{Placement, PlacementHead};
use crate::rank::Rank;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const EDGE_FILE_SUFFIX: &str = ".edge.json";

#[derive(Debug, Serialize, Deserialize)]
struct EdgeFile {
    schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<ItemId>,
    rank: Rank,
}

pub fn edge_file_name(child: ItemId) -> String {
    format!("{}{}", child, EDGE_FILE_SUFFIX)
}

fn child_from_file_name(path: &Path) -> Option<ItemId> {
    let name = file_name_str(path)?;
    ItemId::parse(name.strip_suffix(EDGE_FILE_SUFFIX)?).ok()
}

fn is_edge_file(path: &Path) -> bool {
    path.is_file() && file_name_str(path).is_some_and(|name| name.ends_with(EDGE_FILE_SUFFIX))
}

/// Canonical in-memory order: child id, then rank.
pub fn sort_canonical(edges: &mut [Edge]) {
    edges.sort_by(|a, b| a.to.cmp(&b.to).then_with(|| a.rank.cmp(&b.rank)));
}

/// Sibling order: rank, then child id.
pub fn sort_by_rank(edges: &mut [Edge]) {
    edges.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.to.cmp(&b.to)));
}

#[derive(Debug, Clone)]
pub struct EdgeFileEntry {
    pub path: PathBuf,
    pub placement: Placement,
    pub edge: Edge,
}

/// Result of walking every bucket: readable edges plus the files that were not.
#[derive(Debug, Clone, Default)]
pub struct EdgeScan {
    pub entries: Vec<EdgeFileEntry>,
    pub failures: Vec<RepositoryError>,
}

/// Ordering records for placement buckets, one small JSON file per child.
#[derive(Debug, Clone)]
pub struct EdgeStore {
    graph_dir: PathBuf,
}

impl EdgeStore {
    pub fn new(graph_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph_dir: graph_dir.into(),
        }
    }

    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self::new(workspace.graph_dir())
    }

    pub fn graph_dir(&self) -> &Path {
        &self.graph_dir
    }

    pub fn bucket_dir(&self, placement: &Placement) -> PathBuf {
        self.graph_dir.join(placement.relative_dir())
    }

    pub fn edge_path(&self, placement: &Placement, child: ItemId) -> PathBuf {
        self.bucket_dir(placement).join(edge_file_name(child))
    }

    fn head_category_dir(&self, head: &PlacementHead) -> PathBuf {
        match head {
            PlacementHead::Date(_) => self.graph_dir.join("dates"),
            PlacementHead::Parent(_) => self.graph_dir.join("parents"),
            PlacementHead::Permanent => self.graph_dir.join(crate::placement::PERMANENT),
        }
    }

    /// Replaces the edge files of one bucket directory. Nested sections are left alone.
    pub fn write(&self, placement: &Placement, edges: &[Edge]) -> RepositoryResult<()> {
        let dir = self.bucket_dir(placement);
        self.clear_edge_files(&dir)?;
        if edges.is_empty() {
            prune_empty_dirs(&dir, &self.head_category_dir(placement.head()))
                .map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Delete, &dir))?;
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Write, &dir))?;
        for edge in edges {
            self.write_edge_file(placement, edge)?;
        }
        tracing::debug!(bucket = %placement, edges = edges.len(), "wrote edge bucket");
        Ok(())
    }

    /// Edges of one bucket directory in canonical order; a missing bucket is empty.
    pub fn read(&self, placement: &Placement) -> RepositoryResult<Vec<Edge>> {
        let dir = self.bucket_dir(placement);
        let mut edges = Vec::new();
        for path in self.list_dir(&dir)? {
            if is_edge_file(&path) {
                edges.push(read_edge_file(&path)?);
            }
        }
        sort_canonical(&mut edges);
        Ok(edges)
    }

    pub fn ordered_children(&self, placement: &Placement) -> RepositoryResult<Vec<Edge>> {
        let mut edges = self.read(placement)?;
        sort_by_rank(&mut edges);
        Ok(edges)
    }

    pub fn upsert_edge(&self, placement: &Placement, edge: &Edge) -> RepositoryResult<()> {
        self.write_edge_file(placement, edge)
    }

    /// Removes one child's edge and prunes directories left empty.
    pub fn remove_edge(&self, placement: &Placement, child: ItemId) -> RepositoryResult<bool> {
        let path = self.edge_path(placement, child);
        let removed = remove_file_if_exists(&path)
            .map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Delete, &path))?;
        let dir = self.bucket_dir(placement);
        prune_empty_dirs(&dir, &self.head_category_dir(placement.head()))
            .map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Delete, &dir))?;
        Ok(removed)
    }

    /// Replaces a whole bucket, nested sections included, depth first.
    pub fn write_tree(&self, head: &PlacementHead, tree: &SectionTree) -> RepositoryResult<()> {
        let root = Placement::new(*head, Vec::new()).map_err(|error| {
            RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Write).with_cause(error)
        })?;
        let dir = self.bucket_dir(&root);
        remove_dir_if_exists(&dir).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Delete, &dir))?;
        self.write_subtree(&root, tree)
    }

    fn write_subtree(&self, placement: &Placement, tree: &SectionTree) -> RepositoryResult<()> {
        if tree.is_empty() {
            return Ok(());
        }
        if !tree.edges.is_empty() {
            let dir = self.bucket_dir(placement);
            fs::create_dir_all(&dir).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Write, &dir))?;
            for edge in &tree.edges {
                self.write_edge_file(placement, edge)?;
            }
        }
        for child in &tree.children {
            let Some(segment) = child.segment else {
                continue;
            };
            let nested = placement.child_section(segment).map_err(|error| {
                RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Write)
                    .with_identifier(placement.to_string())
                    .with_cause(error)
            })?;
            self.write_subtree(&nested, child)?;
        }
        Ok(())
    }

    pub fn read_tree(&self, head: &PlacementHead) -> RepositoryResult<SectionTree> {
        let root = Placement::new(*head, Vec::new()).map_err(|error| {
            RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Read).with_cause(error)
        })?;
        self.read_subtree(&root, None)
    }

    fn read_subtree(&self, placement: &Placement, segment: Option<u32>) -> RepositoryResult<SectionTree> {
        let mut tree = SectionTree::new(segment);
        let dir = self.bucket_dir(placement);
        for path in self.list_dir(&dir)? {
            if is_edge_file(&path) {
                tree.edges.push(read_edge_file(&path)?);
            } else if path.is_dir() {
                let Some(child_segment) = file_name_str(&path).and_then(crate::placement::parse_section_dir_name) else {
                    tracing::warn!(path = %path.to_string_lossy(), "skipping unrecognized section directory");
                    continue;
                };
                let nested = placement.child_section(child_segment).map_err(|error| {
                    RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Read)
                        .with_path(&path)
                        .with_cause(error)
                })?;
                tree.children.push(self.read_subtree(&nested, Some(child_segment))?);
            }
        }
        sort_canonical(&mut tree.edges);
        Ok(tree)
    }

    /// Walks every bucket under the graph directory.
    pub fn scan(&self) -> RepositoryResult<EdgeScan> {
        let mut scan = EdgeScan::default();
        self.scan_dir(&self.graph_dir, &mut Vec::new(), &mut scan)?;
        Ok(scan)
    }

    fn scan_dir(&self, dir: &Path, components: &mut Vec<String>, scan: &mut EdgeScan) -> RepositoryResult<()> {
        for path in self.list_dir(dir)? {
            let Some(name) = file_name_str(&path).map(str::to_string) else {
                continue;
            };
            if path.is_dir() {
                components.push(name);
                self.scan_dir(&path, components, scan)?;
                components.pop();
                continue;
            }
            if !name.ends_with(EDGE_FILE_SUFFIX) {
                continue;
            }
            let parts: Vec<&str> = components.iter().map(String::as_str).collect();
            let Some(placement) = Placement::from_relative_components(&parts) else {
                scan.failures.push(
                    RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Parse)
                        .with_path(&path)
                        .with_cause("edge file outside a recognizable bucket"),
                );
                continue;
            };
            match read_edge_file(&path) {
                Ok(edge) => scan.entries.push(EdgeFileEntry { path, placement, edge }),
                Err(error) => {
                    tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping malformed edge");
                    scan.failures.push(error);
                }
            }
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> RepositoryResult<Vec<PathBuf>> {
        sorted_entries(dir).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::List, dir))
    }

    fn clear_edge_files(&self, dir: &Path) -> RepositoryResult<()> {
        for path in self.list_dir(dir)? {
            if is_edge_file(&path) {
                fs::remove_file(&path).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Delete, &path))?;
            }
        }
        Ok(())
    }

    fn write_edge_file(&self, placement: &Placement, edge: &Edge) -> RepositoryResult<()> {
        let path = self.edge_path(placement, edge.to);
        let body = match placement.head() {
            PlacementHead::Parent(parent) => EdgeFile {
                schema: EDGE_SCHEMA.to_string(),
                from: Some(edge.from.unwrap_or(*parent)),
                to: Some(edge.to),
                rank: edge.rank.clone(),
            },
            _ => EdgeFile {
                schema: EDGE_SCHEMA.to_string(),
                from: None,
                to: None,
                rank: edge.rank.clone(),
            },
        };
        let mut bytes = serde_json::to_vec_pretty(&body)
            .map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Serialize, &path))?;
        bytes.push(b'\n');
        atomic_write(&path, &bytes).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Write, &path))
    }
}

fn read_edge_file(path: &Path) -> RepositoryResult<Edge> {
    let bytes = fs::read(path).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Read, path))?;
    let file: EdgeFile =
        serde_json::from_slice(&bytes).map_err(RepositoryError::at(RepositoryScope::Edge, RepositoryOperation::Parse, path))?;
    if file.schema != EDGE_SCHEMA {
        return Err(RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Parse)
            .with_path(path)
            .with_cause(format!("unsupported schema '{}'", file.schema)));
    }
    let named = child_from_file_name(path);
    let to = match (file.to, named) {
        (Some(to), Some(named)) if to != named => {
            return Err(RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Parse)
                .with_path(path)
                .with_cause(format!("edge target {} does not match file name", to)));
        }
        (Some(to), _) => to,
        (None, Some(named)) => named,
        (None, None) => {
            return Err(RepositoryError::new(RepositoryScope::Edge, RepositoryOperation::Parse)
                .with_path(path)
                .with_cause("file name is not an item id"));
        }
    };
    Ok(Edge {
        to,
        rank: file.rank,
        from: file.from,
    })
}
