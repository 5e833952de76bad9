use crate::aliases::AliasRecord;
use crate::edges::{sort_by_rank, SectionTree};
use crate::models::{Edge, ItemId, ItemRecord};
use crate::placement::{Placement, PlacementHead};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasConflict {
    pub canonical_key: String,
    pub raw: String,
    pub kept: ItemId,
    pub rejected: ItemId,
}

impl fmt::Display for AliasConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alias '{}' ({}) kept for {}, rejected for {}",
            self.raw, self.canonical_key, self.kept, self.rejected
        )
    }
}

/// Index contents derived purely from item records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// Bucket → edges in rank order.
    pub edges: BTreeMap<Placement, Vec<Edge>>,
    /// Path relative to `.index/aliases` → alias record.
    pub aliases: BTreeMap<PathBuf, AliasRecord>,
    pub alias_conflicts: Vec<AliasConflict>,
}

impl IndexSnapshot {
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Edges regrouped per bucket root for the recursive writer.
    pub fn trees(&self) -> BTreeMap<PlacementHead, SectionTree> {
        let mut trees: BTreeMap<PlacementHead, SectionTree> = BTreeMap::new();
        for (placement, edges) in &self.edges {
            let tree = trees
                .entry(*placement.head())
                .or_insert_with(|| SectionTree::new(None));
            for edge in edges {
                tree.insert(placement.section(), edge.clone());
            }
        }
        trees
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub items_processed: usize,
    pub edges_created: usize,
    pub aliases_created: usize,
    pub alias_conflicts: Vec<AliasConflict>,
    /// Item files left out because they could not be read.
    pub skipped_records: Vec<String>,
}

impl RebuildSummary {
    pub fn exit_code(&self) -> i32 {
        if self.alias_conflicts.is_empty() && self.skipped_records.is_empty() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RebuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "items processed: {}, edges created: {}, aliases created: {}",
            self.items_processed, self.edges_created, self.aliases_created
        )?;
        for conflict in &self.alias_conflicts {
            writeln!(f, "alias conflict: {}", conflict)?;
        }
        for skipped in &self.skipped_records {
            writeln!(f, "skipped: {}", skipped)?;
        }
        Ok(())
    }
}

/// Builds the full index from `records`; the result does not depend on input order.
pub fn build_index(records: &[ItemRecord]) -> (IndexSnapshot, RebuildSummary) {
    let mut ordered: Vec<&ItemRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.frontmatter
            .created_at
            .cmp(&b.frontmatter.created_at)
            .then_with(|| a.id().cmp(&b.id()))
    });

    let mut snapshot = IndexSnapshot::default();
    for record in &ordered {
        let placement = record.placement();
        let mut edge = Edge::new(record.id(), record.rank().clone());
        if let Some(parent) = placement.parent_id() {
            edge = edge.with_parent(parent);
        }
        snapshot.edges.entry(placement.clone()).or_default().push(edge);

        let Some(raw) = record.frontmatter.alias.as_deref() else {
            continue;
        };
        let alias = match AliasRecord::new(raw, record.id(), record.frontmatter.created_at) {
            Ok(alias) => alias,
            Err(error) => {
                tracing::warn!(item = %record.id(), error = %error, "skipping unusable alias");
                continue;
            }
        };
        let path = alias.relative_path();
        match snapshot.aliases.get(&path) {
            Some(kept) => snapshot.alias_conflicts.push(AliasConflict {
                canonical_key: alias.canonical_key.clone(),
                raw: alias.raw.clone(),
                kept: kept.item_id,
                rejected: alias.item_id,
            }),
            None => {
                snapshot.aliases.insert(path, alias);
            }
        }
    }
    for edges in snapshot.edges.values_mut() {
        sort_by_rank(edges);
    }

    let summary = RebuildSummary {
        items_processed: records.len(),
        edges_created: snapshot.edge_count(),
        aliases_created: snapshot.aliases.len(),
        alias_conflicts: snapshot.alias_conflicts.clone(),
        skipped_records: Vec::new(),
    };
    (snapshot, summary)
}
