use crate::edges::EdgeStore;
use crate::errors::{AppError, AppResult};
use crate::index::{self, CheckReport, RebuildSummary};
use crate::items::ItemRepository;
use crate::migration::{self, MigrationReport};
use crate::models::Edge;
use crate::rebalance::{RankUpdate, RankedItem, Rebalancer};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub fn check(workspace: &Workspace) -> AppResult<CheckReport> {
    workspace.ensure_current()?;
    index::check(workspace)
}

pub fn rebuild_index(workspace: &Workspace) -> AppResult<RebuildSummary> {
    workspace.ensure_current()?;
    index::rebuild(workspace)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    pub items_considered: usize,
    pub applied: Vec<RankUpdate>,
    pub failures: Vec<String>,
}

impl RebalanceReport {
    pub fn exit_code(&self) -> i32 {
        if self.failures.is_empty() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RebalanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for update in &self.applied {
            writeln!(
                f,
                "{} {}: {} -> {}",
                update.placement, update.item_id, update.old_rank, update.new_rank
            )?;
        }
        for failure in &self.failures {
            writeln!(f, "failed: {}", failure)?;
        }
        writeln!(
            f,
            "rebalanced {} of {} item(s), {} failure(s)",
            self.applied.len(),
            self.items_considered,
            self.failures.len()
        )
    }
}

/// Respaces every bucket and writes the changed ranks to records and edges.
pub fn rebalance_ranks(workspace: &Workspace, now: DateTime<Utc>) -> AppResult<RebalanceReport> {
    workspace.ensure_current()?;
    let repository = ItemRepository::new(workspace);
    let store = EdgeStore::for_workspace(workspace);
    let listing = repository.list_all()?;
    let ranked: Vec<RankedItem> = listing.items.iter().map(|stored| RankedItem::from(&stored.record)).collect();
    let updates = Rebalancer::lexo().rebalance(&ranked)?;

    let mut records: HashMap<_, _> = listing
        .items
        .into_iter()
        .map(|stored| (stored.record.id(), stored.record))
        .collect();
    let mut report = RebalanceReport {
        items_considered: ranked.len(),
        ..RebalanceReport::default()
    };
    for update in updates {
        let Some(record) = records.get_mut(&update.item_id) else {
            continue;
        };
        record.frontmatter.rank = update.new_rank.clone();
        record.frontmatter.updated_at = now;
        let mut edge = Edge::new(update.item_id, update.new_rank.clone());
        if let Some(parent) = update.placement.parent_id() {
            edge = edge.with_parent(parent);
        }
        let applied = repository
            .save(record)
            .and_then(|_| store.upsert_edge(&update.placement, &edge));
        match applied {
            Ok(()) => report.applied.push(update),
            Err(error) => {
                tracing::warn!(item = %update.item_id, error = %error, "failed to apply rank update");
                report.failures.push(format!("{}: {}", update.item_id, error));
            }
        }
    }
    tracing::info!(
        considered = report.items_considered,
        applied = report.applied.len(),
        failures = report.failures.len(),
        "rebalanced ranks"
    );
    Ok(report)
}

pub fn migrate(workspace: &mut Workspace, dry_run: bool, now: DateTime<Utc>) -> AppResult<MigrationReport> {
    migration::migrate(workspace, dry_run, now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoctorCommand {
    Check,
    RebuildIndex,
    RebalanceRank,
    Migrate { dry_run: bool },
}

impl DoctorCommand {
    pub fn parse(args: &[String]) -> AppResult<Self> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["check"] => Ok(Self::Check),
            ["rebuild-index"] => Ok(Self::RebuildIndex),
            ["rebalance-rank"] => Ok(Self::RebalanceRank),
            ["migrate"] => Ok(Self::Migrate { dry_run: false }),
            ["migrate", "--dry-run"] => Ok(Self::Migrate { dry_run: true }),
            _ => Err(AppError::Invalid(format!(
                "unknown doctor command '{}'; expected check, rebuild-index, rebalance-rank or migrate [--dry-run]",
                words.join(" ")
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorOutcome {
    pub output: String,
    pub exit_code: i32,
}

pub fn run(root: &Path, command: DoctorCommand, now: DateTime<Utc>) -> AppResult<DoctorOutcome> {
    let mut workspace = Workspace::open(root)?;
    tracing::info!(root = %root.to_string_lossy(), command = ?command, "running doctor");
    let (output, exit_code) = match command {
        DoctorCommand::Check => {
            let report = check(&workspace)?;
            (report.to_string(), report.exit_code())
        }
        DoctorCommand::RebuildIndex => {
            let summary = rebuild_index(&workspace)?;
            (summary.to_string(), summary.exit_code())
        }
        DoctorCommand::RebalanceRank => {
            let report = rebalance_ranks(&workspace, now)?;
            (report.to_string(), report.exit_code())
        }
        DoctorCommand::Migrate { dry_run } => {
            let report = migrate(&mut workspace, dry_run, now)?;
            (report.to_string(), report.exit_code())
        }
    };
    Ok(DoctorOutcome { output, exit_code })
}
