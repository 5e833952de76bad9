use super::{LexoRankGenerator, Rank, RankGenerator};
use crate::errors::RankError;

#[derive(Debug, Clone)]
pub struct RankService<G = LexoRankGenerator> {
    generator: G,
}

impl RankService {
    pub fn lexo() -> Self {
        Self::new(LexoRankGenerator::new())
    }
}

impl Default for RankService {
    fn default() -> Self {
        Self::lexo()
    }
}

impl<G: RankGenerator> RankService<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Rank placing a new sibling before `sorted[0]`.
    pub fn head_rank(&self, sorted: &[Rank]) -> Result<Rank, RankError> {
        match sorted.first() {
            Some(first) => self.generator.prev(first),
            None => Ok(self.generator.middle()),
        }
    }

    /// Rank placing a new sibling after the last one.
    pub fn tail_rank(&self, sorted: &[Rank]) -> Result<Rank, RankError> {
        match sorted.last() {
            Some(last) => self.generator.next(last),
            None => Ok(self.generator.middle()),
        }
    }

    pub fn between_rank(&self, lower: Option<&Rank>, upper: Option<&Rank>) -> Result<Rank, RankError> {
        match (lower, upper) {
            (Some(lower), Some(upper)) => self.generator.between(lower, upper),
            (Some(lower), None) => self.generator.next(lower),
            (None, Some(upper)) => self.generator.prev(upper),
            (None, None) => Ok(self.generator.middle()),
        }
    }

    /// `count` strictly increasing ranks that depend on nothing but `count`.
    ///
    /// A lone sibling sits at the middle of the space; larger groups start at
    /// the bottom and advance by the generator's default step.
    pub fn generate_equally_spaced_ranks(&self, count: usize) -> Result<Vec<Rank>, RankError> {
        match count {
            0 => Ok(Vec::new()),
            1 => Ok(vec![self.generator.middle()]),
            _ => {
                let mut ranks = Vec::with_capacity(count);
                let mut current = self.generator.min();
                ranks.push(current.clone());
                for _ in 1..count {
                    current = self.generator.next(&current)?;
                    ranks.push(current.clone());
                }
                Ok(ranks)
            }
        }
    }
}
