use crate::aliases::{canonicalize, AliasRepository, StoredAlias};
use crate::edges::{EdgeFileEntry, EdgeStore};
use crate::errors::{AppResult, RepositoryError};
use crate::items::{ItemRepository, StoredItem};
use crate::models::ItemId;
use crate::workspace::Workspace;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueKind {
    MissingEdge,
    OrphanedEdge,
    RankMismatch,
    AliasCollision,
    MissingAlias,
    DanglingAlias,
    UnreadableRecord,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingEdge => "MissingEdge",
            Self::OrphanedEdge => "OrphanedEdge",
            Self::RankMismatch => "RankMismatch",
            Self::AliasCollision => "AliasCollision",
            Self::MissingAlias => "MissingAlias",
            Self::DanglingAlias => "DanglingAlias",
            Self::UnreadableRecord => "UnreadableRecord",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckIssue {
    pub kind: IssueKind,
    pub path: Option<PathBuf>,
    pub item: Option<ItemId>,
    pub detail: String,
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(path) = &self.path {
            write!(f, " {}", path.to_string_lossy())?;
        }
        if let Some(item) = &self.item {
            write!(f, " item={}", item)?;
        }
        write!(f, ": {}", self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub items_checked: usize,
    pub edges_checked: usize,
    pub aliases_checked: usize,
    pub issues: Vec<CheckIssue>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }

    pub fn counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}", issue)?;
        }
        writeln!(
            f,
            "checked {} items, {} edges, {} aliases: {} issue(s)",
            self.items_checked,
            self.edges_checked,
            self.aliases_checked,
            self.issues.len()
        )?;
        for (kind, count) in self.counts() {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        Ok(())
    }
}

/// Read-only cross-validation of item records against the edge and alias index.
pub struct ConsistencyChecker<'a> {
    workspace: &'a Workspace,
    issues: Vec<CheckIssue>,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            issues: Vec::new(),
        }
    }

    pub fn run(mut self) -> AppResult<CheckReport> {
        let items = ItemRepository::new(self.workspace).list_all()?;
        let edges = EdgeStore::for_workspace(self.workspace).scan()?;
        let aliases = AliasRepository::new(self.workspace).list()?;

        for failure in items.failures.iter().chain(&edges.failures).chain(&aliases.failures) {
            self.unreadable(failure);
        }
        self.check_edges(&items.items, &edges.entries, &edges.failures);
        self.check_aliases(&items.items, &aliases.aliases);

        let mut issues = self.issues;
        issues.sort();
        let report = CheckReport {
            items_checked: items.items.len(),
            edges_checked: edges.entries.len(),
            aliases_checked: aliases.aliases.len(),
            issues,
        };
        tracing::info!(
            items = report.items_checked,
            edges = report.edges_checked,
            aliases = report.aliases_checked,
            issues = report.issues.len(),
            "consistency check finished"
        );
        Ok(report)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        self.workspace.relative(path).to_path_buf()
    }

    fn push(&mut self, kind: IssueKind, path: Option<&Path>, item: Option<ItemId>, detail: String) {
        let path = path.map(|path| self.relative(path));
        self.issues.push(CheckIssue { kind, path, item, detail });
    }

    fn unreadable(&mut self, failure: &RepositoryError) {
        let path = failure.identifier.as_deref().map(Path::new);
        let detail = failure.cause.clone().unwrap_or_else(|| failure.to_string());
        self.push(IssueKind::UnreadableRecord, path, None, detail);
    }

    fn check_edges(&mut self, items: &[StoredItem], edges: &[EdgeFileEntry], unreadable: &[RepositoryError]) {
        let unreadable: HashSet<&Path> = unreadable
            .iter()
            .filter_map(|failure| failure.identifier.as_deref().map(Path::new))
            .collect();
        let store = EdgeStore::for_workspace(self.workspace);
        let by_path: HashMap<&Path, &EdgeFileEntry> = edges.iter().map(|entry| (entry.path.as_path(), entry)).collect();
        let by_id: HashMap<ItemId, &StoredItem> = items.iter().map(|stored| (stored.record.id(), stored)).collect();

        for stored in items {
            let record = &stored.record;
            let expected = store.edge_path(record.placement(), record.id());
            match by_path.get(expected.as_path()) {
                None if unreadable.contains(expected.as_path()) => {}
                None => self.push(
                    IssueKind::MissingEdge,
                    Some(&stored.path),
                    Some(record.id()),
                    format!("no edge for placement {}", record.placement()),
                ),
                Some(entry) if entry.edge.rank != *record.rank() => self.push(
                    IssueKind::RankMismatch,
                    Some(&entry.path),
                    Some(record.id()),
                    format!("edge rank {} differs from item rank {}", entry.edge.rank, record.rank()),
                ),
                Some(_) => {}
            }
        }

        for entry in edges {
            let backed = by_id
                .get(&entry.edge.to)
                .is_some_and(|stored| stored.record.placement() == &entry.placement);
            let parent = entry.placement.parent_id();
            if !backed {
                self.push(
                    IssueKind::OrphanedEdge,
                    Some(&entry.path),
                    Some(entry.edge.to),
                    format!("no item claims placement {}", entry.placement),
                );
            } else if entry.edge.from != parent {
                let source = entry.edge.from.map_or_else(|| "none".to_string(), |from| from.to_string());
                let bucket = parent.map_or_else(|| "none".to_string(), |parent| parent.to_string());
                self.push(
                    IssueKind::OrphanedEdge,
                    Some(&entry.path),
                    Some(entry.edge.to),
                    format!("edge source {} does not match bucket parent {}", source, bucket),
                );
            }
        }
    }

    fn check_aliases(&mut self, items: &[StoredItem], aliases: &[StoredAlias]) {
        let aliases_dir = self.workspace.aliases_dir();
        let by_id: HashMap<ItemId, &StoredItem> = items.iter().map(|stored| (stored.record.id(), stored)).collect();
        let mut by_key: BTreeMap<String, Vec<&StoredAlias>> = BTreeMap::new();

        for stored in aliases {
            let record = &stored.record;
            let canonical = canonicalize(&record.raw);
            if canonical != record.canonical_key {
                self.push(
                    IssueKind::AliasCollision,
                    Some(&stored.path),
                    Some(record.item_id),
                    format!("canonical key '{}' does not match raw alias '{}'", record.canonical_key, record.raw),
                );
            } else if aliases_dir.join(record.relative_path()) != stored.path {
                self.push(
                    IssueKind::AliasCollision,
                    Some(&stored.path),
                    Some(record.item_id),
                    format!("alias '{}' is stored under the wrong hash", record.raw),
                );
            }
            by_key.entry(canonical).or_default().push(stored);

            let declared = by_id
                .get(&record.item_id)
                .and_then(|item| item.record.frontmatter.alias.as_deref())
                .map(canonicalize);
            if declared.as_deref() != Some(record.canonical_key.as_str()) {
                self.push(
                    IssueKind::DanglingAlias,
                    Some(&stored.path),
                    Some(record.item_id),
                    format!("alias '{}' points at an item that does not declare it", record.raw),
                );
            }
        }
        for (key, group) in &by_key {
            if group.len() > 1 {
                for stored in group {
                    self.push(
                        IssueKind::AliasCollision,
                        Some(&stored.path),
                        Some(stored.record.item_id),
                        format!("{} alias files share canonical key '{}'", group.len(), key),
                    );
                }
            }
        }

        let mut claims: BTreeMap<String, Vec<&StoredItem>> = BTreeMap::new();
        for stored in items {
            if let Some(raw) = stored.record.frontmatter.alias.as_deref() {
                claims.entry(canonicalize(raw)).or_default().push(stored);
            }
        }
        for (key, claimants) in &claims {
            if claimants.len() > 1 {
                for stored in claimants {
                    self.push(
                        IssueKind::AliasCollision,
                        Some(&stored.path),
                        Some(stored.record.id()),
                        format!("{} items claim alias '{}'", claimants.len(), key),
                    );
                }
                continue;
            }
            let stored = claimants[0];
            let indexed = by_key
                .get(key)
                .is_some_and(|group| group.iter().any(|alias| alias.record.item_id == stored.record.id()));
            if !indexed {
                self.push(
                    IssueKind::MissingAlias,
                    Some(&stored.path),
                    Some(stored.record.id()),
                    format!("alias '{}' is not indexed", key),
                );
            }
        }
    }
}

pub fn check(workspace: &Workspace) -> AppResult<CheckReport> {
    ConsistencyChecker::new(workspace).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{create_item, NewItem};
    use crate::models::ItemKind;
    use crate::placement::Placement;
    use chrono::{Duration, TimeZone, Utc};
    use std::fs;

    fn setup() -> (tempfile::TempDir, Workspace) {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::init(root.path(), "UTC").expect("init");
        (root, workspace)
    }

    fn at(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).single().expect("instant") + Duration::seconds(seconds)
    }

    #[test]
    fn empty_workspace_is_clean() {
        let (_root, workspace) = setup();
        let report = check(&workspace).expect("check");
        assert!(report.is_clean());
        assert_eq!(report.exit_code(), 0);
        assert!(report.to_string().contains("0 issue(s)"));
    }

    #[test]
    fn orphaned_edge_file_is_reported() {
        let (_root, workspace) = setup();
        let ghost = ItemId::generate(at(0));
        let path = workspace
            .graph_dir()
            .join(format!("dates/2025-01-15/{}.edge.json", ghost));
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, r#"{"schema":"daybook.edge/1","rank":"0|hzzzzz:"}"#).expect("write");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::OrphanedEdge), 1);
        assert_ne!(report.exit_code(), 0);
        assert!(report.to_string().contains("OrphanedEdge: 1"));
    }

    #[test]
    fn missing_edge_rank_mismatch_and_missing_alias() {
        let (_root, workspace) = setup();
        let day = Placement::parse("2025-01-15").expect("placement");
        let mut new = NewItem::new(ItemKind::Note, day.clone());
        new.alias = Some("daily".to_string());
        let first = create_item(&workspace, new, at(0)).expect("first");
        let second = create_item(&workspace, NewItem::new(ItemKind::Note, day.clone()), at(1)).expect("second");
        assert!(check(&workspace).expect("check").is_clean());

        let store = EdgeStore::for_workspace(&workspace);
        store.remove_edge(&day, first.id()).expect("remove");
        store
            .upsert_edge(&day, &crate::models::Edge::new(second.id(), crate::rank::Rank::parse("0|000001:").expect("rank")))
            .expect("skew");
        AliasRepository::new(&workspace).delete("daily").expect("delete alias");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::MissingEdge), 1);
        assert_eq!(report.count(IssueKind::RankMismatch), 1);
        assert_eq!(report.count(IssueKind::MissingAlias), 1);
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn dangling_alias_and_unreadable_files() {
        let (_root, workspace) = setup();
        let stray = crate::aliases::AliasRecord::new("stray", ItemId::generate(at(0)), at(0)).expect("alias");
        AliasRepository::new(&workspace).save(&stray).expect("save");
        let broken = workspace.items_dir().join("2025/01/15/broken.md");
        fs::create_dir_all(broken.parent().expect("parent")).expect("mkdir");
        fs::write(&broken, "---\nid: [\n---\n").expect("write");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::DanglingAlias), 1);
        assert_eq!(report.count(IssueKind::UnreadableRecord), 1);
        let unreadable = report
            .issues
            .iter()
            .find(|issue| issue.kind == IssueKind::UnreadableRecord)
            .expect("issue");
        assert_eq!(unreadable.path.as_deref(), Some(Path::new("items/2025/01/15/broken.md")));
    }

    #[test]
    fn misplaced_alias_file_is_a_collision() {
        let (_root, workspace) = setup();
        let mut new = NewItem::new(ItemKind::Note, Placement::permanent());
        new.alias = Some("home".to_string());
        create_item(&workspace, new, at(0)).expect("create");
        let correct = workspace.aliases_dir().join(crate::aliases::alias_relative_path("home"));
        let wrong = workspace.aliases_dir().join(format!("00/{}.alias.json", "0".repeat(64)));
        fs::create_dir_all(wrong.parent().expect("parent")).expect("mkdir");
        fs::rename(&correct, &wrong).expect("move");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::AliasCollision), 1);
        assert_eq!(report.count(IssueKind::MissingAlias), 0);
    }

    #[test]
    fn parent_edge_with_foreign_source_is_orphaned() {
        let (_root, workspace) = setup();
        let parent = create_item(&workspace, NewItem::new(ItemKind::Note, Placement::permanent()), at(0)).expect("parent");
        let other = create_item(&workspace, NewItem::new(ItemKind::Note, Placement::permanent()), at(1)).expect("other");
        let bucket = Placement::parent(parent.id());
        let child = create_item(&workspace, NewItem::new(ItemKind::Task, bucket.clone()), at(2)).expect("child");
        assert!(check(&workspace).expect("check").is_clean());

        let path = EdgeStore::for_workspace(&workspace).edge_path(&bucket, child.id());
        let body = format!(
            r#"{{"schema":"daybook.edge/1","from":"{}","to":"{}","rank":"{}"}}"#,
            other.id(),
            child.id(),
            child.rank()
        );
        fs::write(&path, body).expect("rewrite edge");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::OrphanedEdge), 1);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].detail.contains(&other.id().to_string()));
    }

    #[test]
    fn unreadable_edge_is_reported_once() {
        let (_root, workspace) = setup();
        let day = Placement::parse("2025-01-15").expect("placement");
        let item = create_item(&workspace, NewItem::new(ItemKind::Note, day.clone()), at(0)).expect("item");
        let path = EdgeStore::for_workspace(&workspace).edge_path(&day, item.id());
        fs::write(&path, "{not json").expect("corrupt edge");

        let report = check(&workspace).expect("check");
        assert_eq!(report.count(IssueKind::UnreadableRecord), 1);
        assert_eq!(report.count(IssueKind::MissingEdge), 0);
        assert_eq!(report.issues.len(), 1);
    }
}
