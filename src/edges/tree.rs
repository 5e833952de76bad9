use super::sort_canonical;
use crate::models::Edge;

/// One bucket decomposed into nested numeric sections, each with its own edges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionTree {
    pub segment: Option<u32>,
    pub edges: Vec<Edge>,
    pub children: Vec<SectionTree>,
}

impl SectionTree {
    pub fn new(segment: Option<u32>) -> Self {
        Self {
            segment,
            edges: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds `edge` at `section`, creating intermediate nodes. Edges stay in
    /// canonical order and children in segment order.
    pub fn insert(&mut self, section: &[u32], edge: Edge) {
        let Some((first, rest)) = section.split_first() else {
            self.edges.push(edge);
            sort_canonical(&mut self.edges);
            return;
        };
        let position = match self
            .children
            .binary_search_by(|child| child.segment.cmp(&Some(*first)))
        {
            Ok(position) => position,
            Err(position) => {
                self.children.insert(position, SectionTree::new(Some(*first)));
                position
            }
        };
        self.children[position].insert(rest, edge);
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.children.iter().all(SectionTree::is_empty)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len() + self.children.iter().map(SectionTree::edge_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;
    use crate::rank::Rank;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn insert_builds_sorted_nested_sections() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().expect("instant");
        let a = ItemId::generate(start);
        let b = ItemId::generate(start + Duration::seconds(1));
        let rank = Rank::parse("0|hzzzzz:").expect("rank");

        let mut tree = SectionTree::new(None);
        tree.insert(&[3], Edge::new(b, rank.clone()));
        tree.insert(&[1, 2], Edge::new(a, rank.clone()));
        tree.insert(&[], Edge::new(b, rank.clone()));

        assert_eq!(tree.edge_count(), 3);
        assert_eq!(
            tree.children.iter().map(|child| child.segment).collect::<Vec<_>>(),
            vec![Some(1), Some(3)]
        );
        assert_eq!(tree.edges, vec![Edge::new(b, rank.clone())]);
        let nested = &tree.children[0];
        assert!(nested.edges.is_empty());
        assert_eq!(nested.children[0].segment, Some(2));
        assert_eq!(nested.children[0].edges, vec![Edge::new(a, rank)]);
        assert!(SectionTree::new(None).is_empty());
    }
}
