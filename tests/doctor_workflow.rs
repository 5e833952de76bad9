use chrono::{DateTime, Duration, TimeZone, Utc};
use daybook::aliases::{alias_hash, alias_relative_path, canonicalize};
use daybook::doctor::{self, DoctorCommand};
use daybook::edges::EdgeStore;
use daybook::index::IssueKind;
use daybook::items::{create_item, delete_item, move_item, reorder_item, ItemRepository, NewItem, Position};
use daybook::{AppError, Edge, ItemId, ItemKind, Placement, Rank, Workspace};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).single().expect("instant") + Duration::seconds(seconds)
}

fn snapshot_files(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("read dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).expect("relative").to_path_buf();
                files.insert(relative, fs::read_to_string(&path).expect("read file"));
            }
        }
    }
    files
}

#[test]
fn workflows_keep_index_consistent() {
    let root = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::init(root.path(), "UTC").expect("init");
    let day = Placement::parse("2025-01-15").expect("day");

    let mut project = NewItem::new(ItemKind::Note, Placement::permanent());
    project.title = Some("Garden".to_string());
    project.alias = Some("my-alias".to_string());
    let project = create_item(&workspace, project, at(0)).expect("project");

    let first = create_item(&workspace, NewItem::new(ItemKind::Task, day.clone()), at(1)).expect("first");
    let second = create_item(&workspace, NewItem::new(ItemKind::Task, day.clone()), at(2)).expect("second");
    let third = create_item(&workspace, NewItem::new(ItemKind::Event, day.clone()), at(3)).expect("third");

    let store = EdgeStore::for_workspace(&workspace);
    let order = |placement: &Placement| -> Vec<ItemId> {
        store
            .ordered_children(placement)
            .expect("children")
            .into_iter()
            .map(|edge| edge.to)
            .collect()
    };
    assert_eq!(order(&day), vec![first.id(), second.id(), third.id()]);

    reorder_item(&workspace, third.id(), Position::Head, at(4)).expect("reorder");
    assert_eq!(order(&day), vec![third.id(), first.id(), second.id()]);

    let section = Placement::parent(project.id()).child_section(1).expect("section");
    move_item(&workspace, first.id(), section.clone(), Position::Tail, at(5)).expect("move");
    assert_eq!(order(&day), vec![third.id(), second.id()]);
    assert_eq!(order(&section), vec![first.id()]);

    let alias_file = workspace.aliases_dir().join(alias_relative_path("my-alias"));
    assert!(alias_file.is_file());
    let hash = alias_hash(&canonicalize("my-alias"));
    assert_eq!(alias_file.parent().and_then(Path::file_name).and_then(|name| name.to_str()), Some(&hash[..2]));

    let blocked = delete_item(&workspace, project.id());
    assert!(matches!(blocked, Err(AppError::Conflict(_))));
    delete_item(&workspace, first.id()).expect("delete child");
    delete_item(&workspace, project.id()).expect("delete project");
    assert!(!alias_file.exists());

    let outcome = doctor::run(root.path(), DoctorCommand::Check, at(10)).expect("check");
    assert_eq!(outcome.exit_code, 0, "{}", outcome.output);
}

#[test]
fn rebuild_is_deterministic_and_matches_incremental_writes() {
    let root = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::init(root.path(), "UTC").expect("init");
    let day = Placement::parse("2025-01-16").expect("day");
    let parent = create_item(&workspace, NewItem::new(ItemKind::Note, day.clone()), at(0)).expect("parent");
    for offset in 1..=4 {
        let placement = Placement::parent(parent.id()).child_section(offset as u32 % 2 + 1).expect("section");
        let mut item = NewItem::new(ItemKind::Task, placement);
        item.alias = Some(format!("Task {}", offset));
        create_item(&workspace, item, at(offset)).expect("create");
    }
    let incremental = snapshot_files(&workspace.index_dir());

    let summary = doctor::rebuild_index(&workspace).expect("rebuild");
    assert_eq!(summary.items_processed, 5);
    assert_eq!(summary.edges_created, 5);
    assert_eq!(summary.aliases_created, 4);
    assert_eq!(summary.exit_code(), 0);
    let first = snapshot_files(&workspace.index_dir());
    assert_eq!(first, incremental);

    doctor::rebuild_index(&workspace).expect("rebuild again");
    assert_eq!(snapshot_files(&workspace.index_dir()), first);
    assert!(!workspace.rebuild_dir().exists());
}

#[test]
fn empty_workspace_rebuilds_to_zero_counts() {
    let root = tempfile::tempdir().expect("tempdir");
    Workspace::init(root.path(), "UTC").expect("init");

    let outcome = doctor::run(root.path(), DoctorCommand::RebuildIndex, at(0)).expect("rebuild");
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome
        .output
        .contains("items processed: 0, edges created: 0, aliases created: 0"));
}

#[test]
fn orphaned_edge_fails_check() {
    let root = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::init(root.path(), "UTC").expect("init");
    let day = Placement::parse("2025-01-15").expect("day");
    create_item(&workspace, NewItem::new(ItemKind::Note, day.clone()), at(0)).expect("create");

    let ghost = ItemId::generate(at(1));
    EdgeStore::for_workspace(&workspace)
        .upsert_edge(&day, &Edge::new(ghost, Rank::parse("0|i00000:").expect("rank")))
        .expect("orphan edge");

    let report = doctor::check(&workspace).expect("check");
    assert_eq!(report.count(IssueKind::OrphanedEdge), 1);
    assert_ne!(report.exit_code(), 0);

    doctor::rebuild_index(&workspace).expect("rebuild");
    assert!(doctor::check(&workspace).expect("check after rebuild").is_clean());
}

#[test]
fn migration_moves_forward_only() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut workspace = Workspace::init(root.path(), "UTC").expect("init");
    workspace.set_migration_version(1).expect("legacy");

    let id = ItemId::generate(at(0));
    let path = ItemRepository::new(&workspace).item_path(id);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "---\nkind: task\ndate: 2025-01-15\ncontexts: [phone]\n---\nCall back\n").expect("write");

    let dry = doctor::migrate(&mut workspace, true, at(1)).expect("dry run");
    assert_eq!(dry.exit_code(), 0);
    assert_eq!(workspace.migration_version(), 1);

    let report = doctor::migrate(&mut workspace, false, at(2)).expect("migrate");
    assert_eq!(report.exit_code(), 0, "{}", report);
    let version = workspace.migration_version();
    assert!(version > 1);

    let again = doctor::migrate(&mut workspace, false, at(3)).expect("migrate again");
    assert!(again.steps.is_empty());
    assert_eq!(workspace.migration_version(), version);

    let reopened = Workspace::open(root.path()).expect("reopen");
    assert_eq!(reopened.migration_version(), version);
    let record = ItemRepository::new(&reopened).load(id).expect("load");
    assert_eq!(record.frontmatter.contexts.len(), 1);
    assert!(doctor::check(&reopened).expect("check").is_clean());
}
