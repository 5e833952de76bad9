mod check;
mod rebuild;
mod writer;

pub use check::{check, CheckIssue, CheckReport, ConsistencyChecker, IssueKind};
pub use rebuild::{build_index, AliasConflict, IndexSnapshot, RebuildSummary};
pub use writer::IndexWriter;

use crate::errors::AppResult;
use crate::items::ItemRepository;
use crate::workspace::Workspace;

/// Derives the index from every readable item record and swaps it in.
pub fn rebuild(workspace: &Workspace) -> AppResult<RebuildSummary> {
    let listing = ItemRepository::new(workspace).list_all()?;
    let records: Vec<_> = listing.items.into_iter().map(|stored| stored.record).collect();
    let (snapshot, mut summary) = build_index(&records);
    summary.skipped_records = listing.failures.iter().map(ToString::to_string).collect();
    IndexWriter::new(workspace).write(&snapshot)?;
    tracing::info!(
        items = summary.items_processed,
        edges = summary.edges_created,
        aliases = summary.aliases_created,
        conflicts = summary.alias_conflicts.len(),
        skipped = summary.skipped_records.len(),
        "rebuilt index"
    );
    Ok(summary)
}
