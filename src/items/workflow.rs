use super::ItemRepository;
use crate::aliases::{AliasRecord, AliasRepository};
use crate::edges::EdgeStore;
use crate::errors::{AppError, AppResult};
use crate::models::{Edge, ItemId, ItemKind, ItemRecord};
use crate::placement::{Placement, PlacementHead};
use crate::rank::{Rank, RankService};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};

/// Where a new or moved item lands among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    Head,
    #[default]
    Tail,
    After(ItemId),
    Before(ItemId),
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub kind: ItemKind,
    pub title: Option<String>,
    pub placement: Placement,
    pub alias: Option<String>,
    pub body: String,
    pub position: Position,
}

impl NewItem {
    pub fn new(kind: ItemKind, placement: Placement) -> Self {
        Self {
            kind,
            title: None,
            placement,
            alias: None,
            body: String::new(),
            position: Position::Tail,
        }
    }
}

fn edge_for(placement: &Placement, id: ItemId, rank: Rank) -> Edge {
    let edge = Edge::new(id, rank);
    match placement.parent_id() {
        Some(parent) => edge.with_parent(parent),
        None => edge,
    }
}

/// Rejects parent placements whose parent is missing or would create a cycle.
fn validate_target(workspace: &Workspace, target: &Placement, moving: Option<ItemId>) -> AppResult<()> {
    let PlacementHead::Parent(mut ancestor) = *target.head() else {
        return Ok(());
    };
    let repository = ItemRepository::new(workspace);
    loop {
        if Some(ancestor) == moving {
            return Err(AppError::Invalid(format!(
                "cannot place item {} under its own descendant",
                ancestor
            )));
        }
        let record = repository.load(ancestor).map_err(|error| match error {
            AppError::NotFound(_) => AppError::Invalid(format!("parent item {} does not exist", ancestor)),
            other => other,
        })?;
        match record.placement().parent_id() {
            Some(next) => ancestor = next,
            None => return Ok(()),
        }
    }
}

/// Derives a rank for `id` at `position` in `placement`, respacing the bucket
/// when the neighbours leave no room.
fn place(
    workspace: &Workspace,
    placement: &Placement,
    id: ItemId,
    position: Position,
    now: DateTime<Utc>,
) -> AppResult<Rank> {
    let store = EdgeStore::for_workspace(workspace);
    let siblings: Vec<Edge> = store
        .ordered_children(placement)?
        .into_iter()
        .filter(|edge| edge.to != id)
        .collect();
    let index_of = |anchor: ItemId| {
        siblings
            .iter()
            .position(|edge| edge.to == anchor)
            .ok_or_else(|| AppError::NotFound(format!("item {} is not in {}", anchor, placement)))
    };
    let index = match position {
        Position::Head => 0,
        Position::Tail => siblings.len(),
        Position::After(anchor) => index_of(anchor)? + 1,
        Position::Before(anchor) => index_of(anchor)?,
    };
    let lower = index.checked_sub(1).map(|at| &siblings[at].rank);
    let upper = siblings.get(index).map(|edge| &edge.rank);

    let service = RankService::lexo();
    match service.between_rank(lower, upper) {
        Ok(rank) => Ok(rank),
        Err(error) if error.needs_rebalance() => {
            tracing::info!(bucket = %placement, siblings = siblings.len(), error = %error, "respacing bucket to make room");
            let mut ordered: Vec<ItemId> = siblings.iter().map(|edge| edge.to).collect();
            ordered.insert(index, id);
            let ranks = service.generate_equally_spaced_ranks(ordered.len())?;
            respace(workspace, placement, &siblings, &ordered, &ranks, now)?;
            Ok(ranks[index].clone())
        }
        Err(error) => Err(error.into()),
    }
}

fn respace(
    workspace: &Workspace,
    placement: &Placement,
    siblings: &[Edge],
    ordered: &[ItemId],
    ranks: &[Rank],
    now: DateTime<Utc>,
) -> AppResult<()> {
    let repository = ItemRepository::new(workspace);
    let store = EdgeStore::for_workspace(workspace);
    for (id, rank) in ordered.iter().zip(ranks) {
        let Some(current) = siblings.iter().find(|edge| edge.to == *id) else {
            continue;
        };
        if current.rank == *rank {
            continue;
        }
        let mut record = repository.load(*id)?;
        record.frontmatter.rank = rank.clone();
        record.frontmatter.updated_at = now;
        repository.save(&record)?;
        store.upsert_edge(placement, &edge_for(placement, *id, rank.clone()))?;
    }
    Ok(())
}

pub fn create_item(workspace: &Workspace, new: NewItem, now: DateTime<Utc>) -> AppResult<ItemRecord> {
    workspace.ensure_current()?;
    validate_target(workspace, &new.placement, None)?;
    let id = ItemId::generate(now);

    let alias = match new.alias.as_deref() {
        Some(raw) => {
            let record = AliasRecord::new(raw, id, now)?;
            if let Some(existing) = AliasRepository::new(workspace).load_by_slug(raw)? {
                return Err(AppError::Conflict(format!(
                    "alias '{}' already belongs to item {}",
                    raw, existing.item_id
                )));
            }
            Some(record)
        }
        None => None,
    };

    let rank = place(workspace, &new.placement, id, new.position, now)?;
    let mut record = ItemRecord::new(id, new.kind, new.title, new.placement.clone(), rank.clone(), now);
    record.body = new.body;
    record.frontmatter.alias = new.alias;

    ItemRepository::new(workspace).save(&record)?;
    EdgeStore::for_workspace(workspace).upsert_edge(&new.placement, &edge_for(&new.placement, id, rank))?;
    if let Some(alias) = alias {
        AliasRepository::new(workspace).save(&alias)?;
    }
    tracing::info!(item = %id, placement = %new.placement, "created item");
    Ok(record)
}

pub fn move_item(
    workspace: &Workspace,
    id: ItemId,
    target: Placement,
    position: Position,
    now: DateTime<Utc>,
) -> AppResult<ItemRecord> {
    workspace.ensure_current()?;
    let repository = ItemRepository::new(workspace);
    let store = EdgeStore::for_workspace(workspace);
    let mut record = repository.load(id)?;
    validate_target(workspace, &target, Some(id))?;

    let source = record.placement().clone();
    let rank = place(workspace, &target, id, position, now)?;
    record.frontmatter.placement = target.clone();
    record.frontmatter.rank = rank.clone();
    record.frontmatter.updated_at = now;
    repository.save(&record)?;

    if source != target {
        store.remove_edge(&source, id)?;
    }
    store.upsert_edge(&target, &edge_for(&target, id, rank))?;
    tracing::info!(item = %id, from = %source, to = %target, "moved item");
    Ok(record)
}

/// Moves an item among its current siblings.
pub fn reorder_item(workspace: &Workspace, id: ItemId, position: Position, now: DateTime<Utc>) -> AppResult<ItemRecord> {
    let placement = ItemRepository::new(workspace).load(id)?.placement().clone();
    if matches!(position, Position::After(anchor) | Position::Before(anchor) if anchor == id) {
        return Err(AppError::Invalid(format!("item {} cannot be ordered relative to itself", id)));
    }
    move_item(workspace, id, placement, position, now)
}

pub fn delete_item(workspace: &Workspace, id: ItemId) -> AppResult<()> {
    workspace.ensure_current()?;
    let repository = ItemRepository::new(workspace);
    let store = EdgeStore::for_workspace(workspace);
    let record = repository.load(id)?;

    let children = store.read_tree(&PlacementHead::Parent(id))?;
    if !children.is_empty() {
        return Err(AppError::Conflict(format!(
            "item {} still has {} child item(s)",
            id,
            children.edge_count()
        )));
    }

    store.remove_edge(record.placement(), id)?;
    if let Some(alias) = record.frontmatter.alias.as_deref() {
        let aliases = AliasRepository::new(workspace);
        if aliases.load_by_slug(alias)?.is_some_and(|stored| stored.item_id == id) {
            aliases.delete(alias)?;
        }
    }
    repository.delete(id)?;
    tracing::info!(item = %id, "deleted item");
    Ok(())
}
