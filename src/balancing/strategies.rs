//! # Selection Strategies
//!
//! The four endpoint selection algorithms: round robin, smooth weighted
//! round robin, random, and weighted random. Strategies are a closed set of
//! enum variants carrying only the state each algorithm needs (a cursor for
//! round robin, per-endpoint counters already living on the endpoints for
//! the smoothing algorithm), chosen once at session construction. This keeps
//! dynamic dispatch off the per-pick hot path and each algorithm's
//! invariants locally checkable.
//!
//! Every algorithm consumes a non-empty candidate list; callers filter first
//! and never invoke a strategy on an empty set. A single candidate is
//! returned directly without touching any counters.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::types::Endpoint;

/// Which selection algorithm a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Fixed rotation over the candidate list
    RoundRobin,
    /// Nginx-style smooth weighted round robin: proportional to weight
    /// without bursts on any single endpoint
    SmoothWeightedRoundRobin,
    /// Memoryless uniform choice
    Random,
    /// Memoryless choice proportional to declared weight
    WeightedRandom,
}

impl StrategyKind {
    /// Algorithm name for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::SmoothWeightedRoundRobin => "smooth_weighted_round_robin",
            Self::Random => "random",
            Self::WeightedRandom => "weighted_random",
        }
    }
}

/// A strategy instance: the kind plus whatever per-session state the
/// algorithm keeps between picks. Lives inside the session's mutex alongside
/// the endpoint table, so no extra synchronization is needed.
#[derive(Debug)]
pub struct Strategy {
    kind: StrategyKind,
    cursor: usize,
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self { kind, cursor: 0 }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Reset the round-robin cursor after an endpoint was removed from the
    /// table. Between removals the cursor is only clamped into range, so
    /// membership growth does not restart the rotation; a removal resets it
    /// to avoid skipping entries non-deterministically.
    pub fn note_removal(&mut self) {
        self.cursor = 0;
    }

    /// Choose one endpoint from `candidates` (indices into `endpoints`).
    ///
    /// Returns the table index of the chosen endpoint. `candidates` must be
    /// non-empty. Smooth weighted round robin mutates the candidates'
    /// `current_weight` accumulators as a side effect.
    pub fn select(&mut self, endpoints: &mut [Endpoint], candidates: &[usize]) -> usize {
        debug_assert!(!candidates.is_empty(), "select called with no candidates");
        if candidates.len() == 1 {
            return candidates[0];
        }
        match self.kind {
            StrategyKind::RoundRobin => {
                if self.cursor >= candidates.len() {
                    self.cursor = 0;
                }
                let chosen = candidates[self.cursor];
                self.cursor = (self.cursor + 1) % candidates.len();
                chosen
            }
            StrategyKind::SmoothWeightedRoundRobin => {
                let mut total: i64 = 0;
                let mut best = candidates[0];
                for &i in candidates {
                    let ep = &mut endpoints[i];
                    ep.current_weight += ep.effective_weight as i64;
                    total += ep.effective_weight as i64;
                    // strict comparison keeps the first maximum on ties
                    if endpoints[i].current_weight > endpoints[best].current_weight {
                        best = i;
                    }
                }
                endpoints[best].current_weight -= total;
                best
            }
            StrategyKind::Random => {
                candidates[rand::thread_rng().gen_range(0..candidates.len())]
            }
            StrategyKind::WeightedRandom => {
                let weights: Vec<u64> = candidates
                    .iter()
                    .map(|&i| endpoints[i].weight as u64)
                    .collect();
                let total: u64 = weights.iter().sum();
                if total == 0 {
                    // all zero-weight (weight filtering disabled): degrade to uniform
                    return candidates[rand::thread_rng().gen_range(0..candidates.len())];
                }
                let n = rand::thread_rng().gen_range(0..total);
                candidates[cumulative_pick(&weights, n)]
            }
        }
    }
}

/// Walk `weights` accumulating a running sum and return the index of the
/// first entry whose inclusive cumulative sum exceeds `n`.
///
/// Pure so the draw-to-choice mapping is testable independent of the RNG:
/// with weights `[1, 3]` and `n = 2`, the cumulative sums are `1, 4`, so the
/// draw lands in the second entry's range.
pub(crate) fn cumulative_pick(weights: &[u64], n: u64) -> usize {
    let mut sum = 0u64;
    for (i, w) in weights.iter().enumerate() {
        sum += w;
        if n < sum {
            return i;
        }
    }
    weights.len() - 1
}
