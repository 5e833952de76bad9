use super::records::{from_frontmatter, to_frontmatter, RecordV1, RecordV2};
use super::{MigrationStep, ResolutionMap};
use crate::errors::MigrationItemError;
use crate::items::StoredDocument;
use crate::models::{item_schema, ItemFrontmatter, ItemId};
use crate::placement::{Placement, PlacementHead};
use crate::rank::{LexoRankGenerator, Rank, RankGenerator};
use crate::record::RecordDocument;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;

fn document_with(frontmatter: serde_json::Map<String, serde_json::Value>, body: &str) -> RecordDocument {
    RecordDocument {
        frontmatter,
        body: body.to_string(),
    }
}

/// 1 → 2: folds `date`/`parent` + `section` + `sort_key` into `placement` + `rank`.
pub struct UnifyPlacement;

impl UnifyPlacement {
    fn id_for(path: &Path, record: &RecordV1) -> Result<ItemId, MigrationItemError> {
        let raw = record
            .id
            .clone()
            .or_else(|| path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string))
            .unwrap_or_default();
        ItemId::parse(&raw).map_err(|error| MigrationItemError::new(path, "id", error.to_string()))
    }

    fn head_for(path: &Path, record: &RecordV1) -> Result<PlacementHead, MigrationItemError> {
        match (record.date.as_deref(), record.parent.as_deref()) {
            (Some(date), None) => NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map(PlacementHead::Date)
                .map_err(|error| MigrationItemError::new(path, "date", format!("invalid date '{}': {}", date, error))),
            (None, Some(parent)) => ItemId::parse(parent)
                .map(PlacementHead::Parent)
                .map_err(|error| MigrationItemError::new(path, "parent", error.to_string())),
            (Some(_), Some(_)) => Err(MigrationItemError::new(path, "placement", "both date and parent are set")),
            (None, None) => Err(MigrationItemError::new(path, "placement", "neither date nor parent is set")),
        }
    }

    fn section_for(path: &Path, record: &RecordV1) -> Result<Vec<u32>, MigrationItemError> {
        record
            .section
            .iter()
            .map(|segment| {
                segment
                    .as_u64()
                    .or_else(|| segment.as_str().and_then(|text| text.trim().parse().ok()))
                    .and_then(|value| u32::try_from(value).ok())
                    .filter(|value| *value > 0)
                    .ok_or_else(|| {
                        MigrationItemError::new(path, "section", format!("invalid section segment {}", segment))
                    })
            })
            .collect()
    }
}

impl MigrationStep for UnifyPlacement {
    fn from_version(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "unify placement"
    }

    fn collect_external_references(&self, _documents: &[StoredDocument]) -> Vec<String> {
        Vec::new()
    }

    fn transform(
        &self,
        path: &Path,
        document: &RecordDocument,
        _resolutions: &ResolutionMap,
    ) -> Result<RecordDocument, Vec<MigrationItemError>> {
        let record: RecordV1 = from_frontmatter(&document.frontmatter)
            .map_err(|error| vec![MigrationItemError::new(path, "frontmatter", error)])?;

        let mut errors = Vec::new();
        let id = Self::id_for(path, &record).map_err(|error| errors.push(error)).ok();
        let head = Self::head_for(path, &record).map_err(|error| errors.push(error)).ok();
        let section = Self::section_for(path, &record).map_err(|error| errors.push(error)).ok();
        let rank = match record.sort_key.as_deref() {
            Some(key) => Rank::parse(key)
                .map_err(|error| errors.push(MigrationItemError::new(path, "sort_key", error.to_string())))
                .ok(),
            None => Some(LexoRankGenerator::new().middle()),
        };
        let (Some(id), Some(head), Some(section), Some(rank)) = (id, head, section, rank) else {
            return Err(errors);
        };
        let placement = Placement::new(head, section).map_err(|error| vec![MigrationItemError::new(path, "section", error.to_string())])?;

        let created_at = record.created_at.unwrap_or_else(|| id.created_at());
        let upgraded = RecordV2 {
            schema: item_schema(2),
            id: id.to_string(),
            kind: record.kind,
            title: record.title,
            placement: placement.to_string(),
            rank: rank.to_string(),
            alias: record.alias,
            project: record.project,
            contexts: record.contexts,
            created_at,
            updated_at: record.updated_at.unwrap_or(created_at),
            extra: record.extra,
        };
        let frontmatter = to_frontmatter(&upgraded).map_err(|error| vec![MigrationItemError::new(path, "frontmatter", error)])?;
        Ok(document_with(frontmatter, &document.body))
    }
}

/// 2 → 3: replaces alias strings in `project`/`contexts` with item ids.
pub struct ResolveReferences;

fn v2_records(documents: &[StoredDocument]) -> impl Iterator<Item = RecordV2> + '_ {
    documents
        .iter()
        .filter_map(|stored| from_frontmatter::<RecordV2>(&stored.document.frontmatter).ok())
}

impl MigrationStep for ResolveReferences {
    fn from_version(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "resolve references"
    }

    fn collect_external_references(&self, documents: &[StoredDocument]) -> Vec<String> {
        let mut tokens = BTreeSet::new();
        for record in v2_records(documents) {
            for (_, token) in record.references() {
                let token = token.trim();
                if !token.is_empty() && !ItemId::is_valid(token) {
                    tokens.insert(token.to_string());
                }
            }
        }
        tokens.into_iter().collect()
    }

    fn transform(
        &self,
        path: &Path,
        document: &RecordDocument,
        resolutions: &ResolutionMap,
    ) -> Result<RecordDocument, Vec<MigrationItemError>> {
        let record: RecordV2 = from_frontmatter(&document.frontmatter)
            .map_err(|error| vec![MigrationItemError::new(path, "frontmatter", error)])?;

        let mut errors = Vec::new();
        let resolve = |field: &str, token: &str, errors: &mut Vec<MigrationItemError>| {
            let token = token.trim();
            if let Ok(id) = ItemId::parse(token) {
                return Some(id);
            }
            match resolutions.get(token) {
                Some(id) => Some(*id),
                None => {
                    errors.push(MigrationItemError::unresolved(path, field, token));
                    None
                }
            }
        };

        let id = ItemId::parse(&record.id)
            .map_err(|error| errors.push(MigrationItemError::new(path, "id", error.to_string())))
            .ok();
        let placement = Placement::parse(&record.placement)
            .map_err(|error| errors.push(MigrationItemError::new(path, "placement", error.to_string())))
            .ok();
        let rank = Rank::parse(&record.rank)
            .map_err(|error| errors.push(MigrationItemError::new(path, "rank", error.to_string())))
            .ok();
        let project = record
            .project
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .and_then(|token| resolve("project", token, &mut errors));
        let mut contexts = Vec::new();
        for token in record.contexts.iter().filter(|token| !token.trim().is_empty()) {
            if let Some(id) = resolve("contexts", token, &mut errors) {
                if !contexts.contains(&id) {
                    contexts.push(id);
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        let (Some(id), Some(placement), Some(rank)) = (id, placement, rank) else {
            return Err(errors);
        };

        let upgraded = ItemFrontmatter {
            schema: item_schema(3),
            id,
            kind: record.kind,
            title: record.title,
            placement,
            rank,
            alias: record.alias,
            project,
            contexts,
            created_at: record.created_at,
            updated_at: record.updated_at,
            extra: record.extra,
        };
        let frontmatter = to_frontmatter(&upgraded).map_err(|error| vec![MigrationItemError::new(path, "frontmatter", error)])?;
        Ok(document_with(frontmatter, &document.body))
    }
}
