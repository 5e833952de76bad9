use crate::errors::RebalanceError;
use crate::models::{ItemId, ItemRecord};
use crate::placement::Placement;
use crate::rank::{Rank, RankGenerator, RankService};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// The facts about an item the rebalancer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedItem {
    pub id: ItemId,
    pub placement: Placement,
    pub rank: Rank,
    pub created_at: DateTime<Utc>,
}

impl From<&ItemRecord> for RankedItem {
    fn from(record: &ItemRecord) -> Self {
        Self {
            id: record.id(),
            placement: record.placement().clone(),
            rank: record.rank().clone(),
            created_at: record.frontmatter.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankUpdate {
    pub item_id: ItemId,
    pub placement: Placement,
    pub old_rank: Rank,
    pub new_rank: Rank,
}

pub struct Rebalancer<G = crate::rank::LexoRankGenerator> {
    service: RankService<G>,
}

impl Rebalancer {
    pub fn lexo() -> Self {
        Self::new(RankService::lexo())
    }
}

impl<G: RankGenerator> Rebalancer<G> {
    pub fn new(service: RankService<G>) -> Self {
        Self { service }
    }

    /// Respaces every placement group, returning only ranks that change.
    pub fn rebalance(&self, items: &[RankedItem]) -> Result<Vec<RankUpdate>, RebalanceError> {
        let mut groups: BTreeMap<&Placement, Vec<&RankedItem>> = BTreeMap::new();
        for item in items {
            groups.entry(&item.placement).or_default().push(item);
        }
        let mut updates = Vec::new();
        for (placement, group) in groups {
            updates.extend(self.rebalance_refs(placement, group)?);
        }
        Ok(updates)
    }

    pub fn rebalance_group(&self, placement: &Placement, items: &[RankedItem]) -> Result<Vec<RankUpdate>, RebalanceError> {
        if items.is_empty() {
            return Err(RebalanceError::EmptyGroup {
                placement: placement.to_string(),
            });
        }
        self.rebalance_refs(placement, items.iter().collect())
    }

    fn rebalance_refs(&self, placement: &Placement, mut group: Vec<&RankedItem>) -> Result<Vec<RankUpdate>, RebalanceError> {
        group.sort_by(|a, b| {
            self.service
                .generator()
                .compare(&a.rank, &b.rank)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        let ranks = self
            .service
            .generate_equally_spaced_ranks(group.len())
            .map_err(|source| RebalanceError::RankGenerationFailed {
                placement: placement.to_string(),
                source,
            })?;
        Ok(group
            .into_iter()
            .zip(ranks)
            .filter(|(item, rank)| item.rank != *rank)
            .map(|(item, new_rank)| RankUpdate {
                item_id: item.id,
                placement: placement.clone(),
                old_rank: item.rank.clone(),
                new_rank,
            })
            .collect())
    }
}
