mod records;
mod steps;

pub use records::{RecordV1, RecordV2};
pub use steps::{ResolveReferences, UnifyPlacement};

use crate::aliases::canonicalize;
use crate::errors::{AppError, AppResult, MigrationItemError};
use crate::index::{self, RebuildSummary};
use crate::items::{ItemRepository, StoredDocument};
use crate::models::{ItemId, ItemKind, ItemRecord, CURRENT_SCHEMA_VERSION};
use crate::placement::Placement;
use crate::rank::{Rank, RankGenerator, RankService};
use crate::record::{encode_item, RecordDocument};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Reference token → item id, built by a full-corpus scan before any transform.
pub type ResolutionMap = BTreeMap<String, ItemId>;

pub trait MigrationStep {
    fn from_version(&self) -> u32;

    fn to_version(&self) -> u32 {
        self.from_version() + 1
    }

    fn name(&self) -> &'static str;

    fn needs_transformation(&self, document: &RecordDocument) -> bool {
        document.schema_version() == Some(self.from_version())
    }

    /// Distinct tokens that must be resolved before `transform` can run.
    fn collect_external_references(&self, documents: &[StoredDocument]) -> Vec<String>;

    fn transform(
        &self,
        path: &Path,
        document: &RecordDocument,
        resolutions: &ResolutionMap,
    ) -> Result<RecordDocument, Vec<MigrationItemError>>;
}

pub fn default_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![Box::new(UnifyPlacement), Box::new(ResolveReferences)]
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Existing(ItemId),
    /// A new permanent record that must be written when the step commits.
    Created(Box<ItemRecord>),
}

impl Resolution {
    pub fn id(&self) -> ItemId {
        match self {
            Self::Existing(id) => *id,
            Self::Created(record) => record.id(),
        }
    }
}

pub trait ReferenceResolver {
    /// `Ok(None)` leaves the token unresolved.
    fn resolve(&mut self, token: &str) -> AppResult<Option<Resolution>>;
}

/// Resolves tokens as aliases across the corpus, minting permanent notes for the rest.
pub struct AliasResolver {
    known: HashMap<String, ItemId>,
    minted: HashMap<String, ItemId>,
    now: DateTime<Utc>,
    next_rank: Rank,
    service: RankService,
}

impl AliasResolver {
    pub fn new(documents: &[StoredDocument], now: DateTime<Utc>) -> Self {
        let mut known = HashMap::new();
        for stored in documents {
            let document = &stored.document;
            let id = document
                .string_field("id")
                .or_else(|| stored.path.file_stem().and_then(|stem| stem.to_str()))
                .and_then(|raw| ItemId::parse(raw).ok());
            if let (Some(id), Some(alias)) = (id, document.string_field("alias")) {
                let key = canonicalize(alias);
                if !key.is_empty() {
                    known.entry(key).or_insert(id);
                }
            }
        }
        let service = RankService::lexo();
        let next_rank = service.generator().middle();
        Self {
            known,
            minted: HashMap::new(),
            now,
            next_rank,
            service,
        }
    }

    fn mint(&mut self, token: &str) -> AppResult<ItemRecord> {
        let offset = i64::try_from(self.minted.len()).unwrap_or(i64::MAX);
        let created_at = self.now + chrono::Duration::milliseconds(offset);
        let rank = self.next_rank.clone();
        self.next_rank = self.service.between_rank(Some(&rank), None)?;
        let mut record = ItemRecord::new(
            ItemId::generate(created_at),
            ItemKind::Note,
            Some(token.to_string()),
            Placement::permanent(),
            rank,
            created_at,
        );
        record.frontmatter.alias = Some(token.to_string());
        Ok(record)
    }
}

impl ReferenceResolver for AliasResolver {
    fn resolve(&mut self, token: &str) -> AppResult<Option<Resolution>> {
        let key = canonicalize(token);
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(id) = self.known.get(&key).or_else(|| self.minted.get(&key)) {
            return Ok(Some(Resolution::Existing(*id)));
        }
        let record = self.mint(token)?;
        self.minted.insert(key, record.id());
        Ok(Some(Resolution::Created(Box::new(record))))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub from_version: u32,
    pub to_version: u32,
    pub name: String,
    pub records_affected: usize,
    pub tokens: Vec<String>,
    pub created: Vec<(ItemId, String)>,
    pub errors: Vec<MigrationItemError>,
    pub committed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub starting_version: u32,
    pub target_version: u32,
    pub final_version: u32,
    pub steps: Vec<StepReport>,
    pub index: Option<RebuildSummary>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.errors.is_empty())
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(
            f,
            "migration{}: version {} -> {}",
            mode, self.starting_version, self.target_version
        )?;
        if self.steps.is_empty() {
            writeln!(f, "workspace is already at version {}", self.final_version)?;
        }
        for step in &self.steps {
            let state = match (step.errors.is_empty(), step.committed) {
                (false, _) => "halted",
                (true, true) => "committed",
                (true, false) => "planned",
            };
            writeln!(
                f,
                "step {} -> {} {}: {} record(s), {} token(s), {} new record(s) [{}]",
                step.from_version,
                step.to_version,
                step.name,
                step.records_affected,
                step.tokens.len(),
                step.created.len(),
                state
            )?;
            for token in &step.tokens {
                writeln!(f, "  resolve: {}", token)?;
            }
            for (id, alias) in &step.created {
                writeln!(f, "  create: {} ({})", id, alias)?;
            }
            for error in &step.errors {
                writeln!(f, "  error: {}", error)?;
            }
        }
        if let Some(index) = &self.index {
            write!(f, "index: {}", index)?;
        }
        writeln!(f, "workspace version: {}", self.final_version)
    }
}

/// Runs ordered migration steps over every item record.
pub struct Migrator<'a, R: ReferenceResolver> {
    workspace: &'a mut Workspace,
    steps: Vec<Box<dyn MigrationStep>>,
    resolver: R,
    target: u32,
}

impl<'a, R: ReferenceResolver> Migrator<'a, R> {
    pub fn new(workspace: &'a mut Workspace, steps: Vec<Box<dyn MigrationStep>>, resolver: R) -> Self {
        let target = steps
            .iter()
            .map(|step| step.to_version())
            .max()
            .unwrap_or(CURRENT_SCHEMA_VERSION);
        Self {
            workspace,
            steps,
            resolver,
            target,
        }
    }

    pub fn run(&mut self, mut documents: Vec<StoredDocument>, unreadable: Vec<MigrationItemError>, dry_run: bool) -> AppResult<MigrationReport> {
        let starting = self.workspace.migration_version();
        if starting > self.target {
            return Err(AppError::UnsupportedVersion {
                current: starting,
                supported: self.target,
            });
        }
        let mut report = MigrationReport {
            dry_run,
            starting_version: starting,
            target_version: self.target,
            final_version: starting,
            ..MigrationReport::default()
        };
        if starting == self.target {
            return Ok(report);
        }

        let mut version = starting;
        let mut blocking = unreadable;
        for stored in &documents {
            match stored.document.schema_version() {
                Some(found) if found >= starting => {}
                Some(found) => blocking.push(MigrationItemError::new(
                    &stored.path,
                    "schema",
                    format!("record at version {} is older than workspace version {}", found, starting),
                )),
                None => blocking.push(MigrationItemError::new(&stored.path, "schema", "unrecognized schema tag")),
            }
        }

        let mut steps: Vec<&dyn MigrationStep> = self
            .steps
            .iter()
            .map(|step| &**step)
            .filter(|step| step.from_version() >= starting && step.to_version() <= self.target)
            .collect();
        steps.sort_by_key(|step| step.from_version());

        let mut touched = BTreeSet::new();
        for step in steps {
            if step.from_version() != version {
                return Err(AppError::Internal(format!(
                    "no migration step from version {}",
                    version
                )));
            }
            let mut outcome = evaluate_step(step, &documents, &mut self.resolver)?;
            outcome.report.errors.splice(0..0, std::mem::take(&mut blocking));
            if !outcome.report.errors.is_empty() {
                tracing::warn!(
                    step = step.name(),
                    errors = outcome.report.errors.len(),
                    "migration step halted; nothing written"
                );
                report.steps.push(outcome.report);
                return Ok(report);
            }
            touched.extend(apply_in_memory(
                self.workspace,
                &mut documents,
                outcome.transformed,
                &outcome.created,
            )?);
            version = step.to_version();
            report.steps.push(outcome.report);
        }

        if !dry_run {
            commit_run(self.workspace, &documents, &touched)?;
            for step in &mut report.steps {
                step.committed = true;
            }
            report.index = Some(index::rebuild(self.workspace)?);
            self.workspace.set_migration_version(self.target)?;
            report.final_version = self.target;
        }
        tracing::info!(
            from = starting,
            to = self.target,
            dry_run,
            "migration finished"
        );
        Ok(report)
    }
}

fn evaluate_step<R: ReferenceResolver>(
    step: &dyn MigrationStep,
    documents: &[StoredDocument],
    resolver: &mut R,
) -> AppResult<StepOutcome> {
    let candidates: Vec<StoredDocument> = documents
        .iter()
        .filter(|stored| step.needs_transformation(&stored.document))
        .cloned()
        .collect();
    let mut report = StepReport {
        from_version: step.from_version(),
        to_version: step.to_version(),
        name: step.name().to_string(),
        records_affected: candidates.len(),
        ..StepReport::default()
    };

    report.tokens = step.collect_external_references(&candidates);
    let mut resolutions = ResolutionMap::new();
    let mut created = Vec::new();
    for token in &report.tokens {
        match resolver.resolve(token)? {
            Some(resolution) => {
                resolutions.insert(token.clone(), resolution.id());
                if let Resolution::Created(record) = resolution {
                    report.created.push((record.id(), token.clone()));
                    created.push(*record);
                }
            }
            None => tracing::debug!(token = %token, "reference left unresolved"),
        }
    }

    let mut transformed = Vec::with_capacity(candidates.len());
    for stored in &candidates {
        match step.transform(&stored.path, &stored.document, &resolutions) {
            Ok(document) => transformed.push(StoredDocument {
                path: stored.path.clone(),
                document,
            }),
            Err(errors) => report.errors.extend(errors),
        }
    }
    tracing::info!(
        step = step.name(),
        records = report.records_affected,
        tokens = report.tokens.len(),
        created = report.created.len(),
        errors = report.errors.len(),
        "migration step evaluated"
    );
    Ok(StepOutcome {
        report,
        transformed,
        created,
    })
}

/// Writes every record the run changed or created. Runs only after all steps succeeded.
fn commit_run(workspace: &Workspace, documents: &[StoredDocument], touched: &BTreeSet<PathBuf>) -> AppResult<()> {
    let repository = ItemRepository::new(workspace);
    for stored in documents.iter().filter(|stored| touched.contains(&stored.path)) {
        repository.write_document(&stored.path, &stored.document)?;
    }
    tracing::info!(records = touched.len(), "migration records written");
    Ok(())
}

struct StepOutcome {
    report: StepReport,
    transformed: Vec<StoredDocument>,
    created: Vec<ItemRecord>,
}

fn apply_in_memory(
    workspace: &Workspace,
    documents: &mut Vec<StoredDocument>,
    transformed: Vec<StoredDocument>,
    created: &[ItemRecord],
) -> AppResult<Vec<PathBuf>> {
    let mut touched: Vec<PathBuf> = transformed.iter().map(|stored| stored.path.clone()).collect();
    let mut by_path: HashMap<_, _> = transformed
        .into_iter()
        .map(|stored| (stored.path, stored.document))
        .collect();
    for stored in documents.iter_mut() {
        if let Some(document) = by_path.remove(&stored.path) {
            stored.document = document;
        }
    }
    let repository = ItemRepository::new(workspace);
    for record in created {
        let document = encode_item(record).map_err(|error| AppError::Internal(error.to_string()))?;
        let path = repository.item_path(record.id());
        touched.push(path.clone());
        documents.push(StoredDocument { path, document });
    }
    Ok(touched)
}

/// Migrates the workspace to the current version with the default steps and resolver.
pub fn migrate(workspace: &mut Workspace, dry_run: bool, now: DateTime<Utc>) -> AppResult<MigrationReport> {
    let listing = ItemRepository::new(workspace).list_documents()?;
    let unreadable = listing
        .failures
        .iter()
        .map(|failure| {
            let path = failure.identifier.clone().unwrap_or_default();
            MigrationItemError::new(Path::new(&path), "document", failure.cause.clone().unwrap_or_default())
        })
        .collect();
    let resolver = AliasResolver::new(&listing.documents, now);
    Migrator::new(workspace, default_steps(), resolver).run(listing.documents, unreadable, dry_run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{check, IssueKind};
    use chrono::TimeZone;
    use std::fs;

    const HOME: &str = "0194a0b4-6c00-7000-8000-0000000000aa";
    const TASK: &str = "0194a0b4-6c00-7000-8000-0000000000bb";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).single().expect("instant")
    }

    fn legacy_workspace() -> (tempfile::TempDir, Workspace) {
        let root = tempfile::tempdir().expect("tempdir");
        let mut workspace = Workspace::init(root.path(), "UTC").expect("init");
        workspace.set_migration_version(1).expect("legacy version");
        (root, workspace)
    }

    fn write_item(workspace: &Workspace, id: &str, text: &str) -> std::path::PathBuf {
        let id = ItemId::parse(id).expect("id");
        let path = ItemRepository::new(workspace).item_path(id);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, text).expect("write");
        path
    }

    fn seed(workspace: &Workspace) {
        write_item(
            workspace,
            HOME,
            "---\nkind: note\ndate: 2025-01-10\nalias: Home\n---\n",
        );
        write_item(
            workspace,
            TASK,
            &format!(
                "---\nkind: task\nparent: {}\nsection: [1]\nsort_key: \"0|i00000:\"\nproject: home\ncontexts: [errands]\n---\n\nBuy milk\n",
                HOME
            ),
        );
    }

    #[test]
    fn full_migration_reaches_current_version_with_clean_index() {
        let (_root, mut workspace) = legacy_workspace();
        seed(&workspace);

        let report = migrate(&mut workspace, false, now()).expect("migrate");
        assert!(report.succeeded(), "{}", report);
        assert_eq!(report.final_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(workspace.migration_version(), CURRENT_SCHEMA_VERSION);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].tokens, vec!["errands", "home"]);
        assert_eq!(report.steps[1].created.len(), 1);
        assert_eq!(report.steps[1].created[0].1, "errands");

        let repository = ItemRepository::new(&workspace);
        let task = repository.load(ItemId::parse(TASK).expect("id")).expect("task");
        assert_eq!(task.frontmatter.project, ItemId::parse(HOME).ok());
        assert_eq!(task.frontmatter.contexts, vec![report.steps[1].created[0].0]);
        assert_eq!(task.placement().to_string(), format!("{}/1", HOME));
        assert_eq!(task.body, "Buy milk\n");

        let listing = repository.list_all().expect("list");
        assert_eq!(listing.items.len(), 3);
        assert!(listing.failures.is_empty());
        assert!(check(&workspace).expect("check").is_clean());
    }

    #[test]
    fn dry_run_reports_plan_and_writes_nothing() {
        let (_root, mut workspace) = legacy_workspace();
        seed(&workspace);
        let before = ItemRepository::new(&workspace).item_files().expect("files");

        let report = migrate(&mut workspace, true, now()).expect("dry run");
        assert!(report.dry_run);
        assert!(report.succeeded());
        assert_eq!(report.final_version, 1);
        assert_eq!(workspace.migration_version(), 1);
        assert_eq!(report.steps[0].records_affected, 2);
        assert_eq!(report.steps[1].records_affected, 2);
        assert_eq!(report.steps[1].created.len(), 1);
        assert!(report.steps.iter().all(|step| !step.committed));
        assert_eq!(ItemRepository::new(&workspace).item_files().expect("files"), before);
        assert!(report.to_string().contains("dry run"));
    }

    struct NoResolver;

    impl ReferenceResolver for NoResolver {
        fn resolve(&mut self, _token: &str) -> AppResult<Option<Resolution>> {
            Ok(None)
        }
    }

    #[test]
    fn unresolved_references_halt_without_writing_anything() {
        let (root, mut workspace) = legacy_workspace();
        seed(&workspace);
        let task_path = ItemRepository::new(&workspace).item_path(ItemId::parse(TASK).expect("id"));
        let before = fs::read(&task_path).expect("task before");
        let listing = ItemRepository::new(&workspace).list_documents().expect("documents");
        let report = Migrator::new(&mut workspace, default_steps(), NoResolver)
            .run(listing.documents, Vec::new(), false)
            .expect("run");

        assert!(!report.succeeded());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.final_version, 1);
        assert_eq!(workspace.migration_version(), 1);
        assert!(report.steps.iter().all(|step| !step.committed));
        assert!(report.index.is_none());
        let tokens: Vec<_> = report.steps[1]
            .errors
            .iter()
            .filter_map(|error| error.token.clone())
            .collect();
        assert_eq!(tokens, vec!["home", "errands"]);

        assert_eq!(fs::read(&task_path).expect("task after"), before);
        let reopened = Workspace::open(root.path()).expect("reopen");
        assert_eq!(reopened.migration_version(), 1);
    }

    #[test]
    fn minted_notes_are_not_written_when_a_later_record_fails() {
        let (_root, mut workspace) = legacy_workspace();
        seed(&workspace);
        write_item(
            &workspace,
            "0194a0b4-6c00-7000-8000-0000000000dd",
            "---\nschema: daybook.item.frontmatter/2\nid: 0194a0b4-6c00-7000-8000-0000000000dd\nkind: note\nplacement: nowhere\nrank: \"0|hzzzzz:\"\ncontexts: [garden]\ncreated_at: 2025-01-12T08:00:00Z\nupdated_at: 2025-01-12T08:00:00Z\n---\n",
        );
        let before = ItemRepository::new(&workspace).item_files().expect("files");

        let report = migrate(&mut workspace, false, now()).expect("migrate");
        assert!(!report.succeeded());
        assert_eq!(report.steps.len(), 2);
        assert!(!report.steps[1].created.is_empty());
        assert_eq!(report.steps[1].errors[0].field, "placement");
        assert_eq!(workspace.migration_version(), 1);
        assert_eq!(ItemRepository::new(&workspace).item_files().expect("files"), before);
        let task = ItemRepository::new(&workspace)
            .read_document(&ItemRepository::new(&workspace).item_path(ItemId::parse(TASK).expect("id")))
            .expect("task");
        assert_eq!(task.schema_version(), Some(1));
    }

    #[test]
    fn malformed_v1_record_halts_first_step() {
        let (_root, mut workspace) = legacy_workspace();
        seed(&workspace);
        write_item(
            &workspace,
            "0194a0b4-6c00-7000-8000-0000000000cc",
            "---\nkind: note\ndate: someday\n---\n",
        );
        let report = migrate(&mut workspace, false, now()).expect("migrate");
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].errors.len(), 1);
        assert_eq!(report.steps[0].errors[0].field, "date");
        assert_eq!(workspace.migration_version(), 1);
    }

    #[test]
    fn current_workspace_needs_no_steps() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut workspace = Workspace::init(root.path(), "UTC").expect("init");
        let report = migrate(&mut workspace, false, now()).expect("migrate");
        assert!(report.steps.is_empty());
        assert_eq!(report.exit_code(), 0);
        assert!(report.index.is_none());
        assert_eq!(check(&workspace).expect("check").count(IssueKind::MissingEdge), 0);
    }
}
