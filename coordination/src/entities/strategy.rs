//! Team selection strategies
//!
//! A coach hands its strategy the bench snapshot and gets back the ids to
//! send onto the field. Strategies own their randomness so a seeded match
//! picks the same teams on every run.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::state::{BenchEntry, ContestantId};

/// Configured selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Uniformly shuffled pick
    #[default]
    Random,
    /// Highest strength first, lower id breaking ties
    Strongest,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Strongest => write!(f, "strongest"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "strongest" => Ok(Self::Strongest),
            other => Err(KernelError::config(format!(
                "unknown selection strategy '{other}' (expected random or strongest)"
            ))),
        }
    }
}

pub trait SelectionStrategy: Send {
    fn name(&self) -> &'static str;

    /// Pick `count` contestants from `bench`. Returns fewer only when the
    /// bench holds fewer.
    fn pick(&mut self, bench: &[BenchEntry], count: usize) -> BTreeSet<ContestantId>;
}

pub struct RandomSelection {
    rng: ChaCha8Rng,
}

impl RandomSelection {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for RandomSelection {
    fn name(&self) -> &'static str {
        "random"
    }

    fn pick(&mut self, bench: &[BenchEntry], count: usize) -> BTreeSet<ContestantId> {
        // Sort first so the pick depends only on the seed, not on snapshot order
        let mut ids: Vec<ContestantId> = bench.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.shuffle(&mut self.rng);
        ids.into_iter().take(count).collect()
    }
}

#[derive(Debug, Default)]
pub struct StrongestSelection;

impl SelectionStrategy for StrongestSelection {
    fn name(&self) -> &'static str {
        "strongest"
    }

    fn pick(&mut self, bench: &[BenchEntry], count: usize) -> BTreeSet<ContestantId> {
        let mut entries = bench.to_vec();
        entries.sort_by(|a, b| b.strength.cmp(&a.strength).then(a.id.cmp(&b.id)));
        entries.into_iter().take(count).map(|e| e.id).collect()
    }
}

/// Build a strategy instance for one coach
pub fn build(kind: StrategyKind, seed: u64) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::Random => Box::new(RandomSelection::new(seed)),
        StrategyKind::Strongest => Box::new(StrongestSelection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(strengths: &[i32]) -> Vec<BenchEntry> {
        strengths
            .iter()
            .enumerate()
            .map(|(i, s)| BenchEntry {
                id: ContestantId(i as u8 + 1),
                strength: *s,
            })
            .collect()
    }

    #[test]
    fn test_strongest_prefers_strength_then_id() {
        let mut strategy = StrongestSelection;
        let picked = strategy.pick(&bench(&[12, 19, 15, 19, 11]), 3);
        let expected: BTreeSet<_> = [2, 3, 4].into_iter().map(ContestantId).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_random_is_seed_deterministic() {
        let entries = bench(&[10, 11, 12, 13, 14]);
        let mut a = RandomSelection::new(7);
        let mut b = RandomSelection::new(7);

        for _ in 0..10 {
            let pick = a.pick(&entries, 3);
            assert_eq!(pick.len(), 3);
            assert_eq!(pick, b.pick(&entries, 3));
        }
    }

    #[test]
    fn test_random_ignores_snapshot_order() {
        let entries = bench(&[10, 11, 12, 13, 14]);
        let mut reversed = entries.clone();
        reversed.reverse();

        assert_eq!(
            RandomSelection::new(3).pick(&entries, 3),
            RandomSelection::new(3).pick(&reversed, 3)
        );
    }

    #[test]
    fn test_short_bench_returns_everyone() {
        let mut strategy = build(StrategyKind::Random, 1);
        assert_eq!(strategy.pick(&bench(&[10, 10]), 3).len(), 2);
        assert_eq!(strategy.name(), "random");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Strongest".parse::<StrategyKind>().unwrap(), StrategyKind::Strongest);
        assert!("weakest".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Random.to_string(), "random");
    }
}
