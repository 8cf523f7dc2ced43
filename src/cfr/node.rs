//! A single infostate's CFR table (component F): accumulated regret, the
//! reach-weighted strategy sum, and the current regret-matched profile.
//! Grounded in the legacy `train.rs`'s `Node` (`regret_sum`/`strategy`/
//! `strategy_sum`), renamed to the vocabulary §4.F's algorithm uses. The
//! teacher sizes these per-action vectors with `SmallVec<[f32; VEC_SIZE]>`
//! rather than a plain `Vec`, since almost every infostate's legal-action
//! count is small enough to stay inline; this crate keeps that choice.

use smallvec::SmallVec;

use crate::helpers::VEC_SIZE;

/// One infostate's accumulated CFR bookkeeping, sized to that infostate's
/// legal action count and indexed the same way `Board::actions()` orders
/// them.
#[derive(Debug, Clone)]
pub struct Node {
    pub regret: SmallVec<[f32; VEC_SIZE]>,
    pub strategy_sum: SmallVec<[f32; VEC_SIZE]>,
    pub profile: SmallVec<[f32; VEC_SIZE]>,
}

impl Node {
    /// A fresh node for an infostate with `action_count` legal actions,
    /// starting from the uniform profile.
    pub fn new(action_count: usize) -> Self {
        let uniform = if action_count == 0 { 0.0 } else { 1.0 / action_count as f32 };
        Node {
            regret: smallvec::smallvec![0.0; action_count],
            strategy_sum: smallvec::smallvec![0.0; action_count],
            profile: smallvec::smallvec![uniform; action_count],
        }
    }

    /// Recomputes `profile` from `regret` by regret matching: proportional
    /// to positive regret, falling back to uniform when no action has
    /// positive regret (§4.F's "regret matching correctness" invariant).
    pub fn regret_match(&mut self) {
        let positive_sum: f32 = self.regret.iter().copied().filter(|&r| r > 0.0).sum();
        if positive_sum > 0.0 {
            for (profile_entry, &regret) in self.profile.iter_mut().zip(self.regret.iter()) {
                *profile_entry = if regret > 0.0 { regret / positive_sum } else { 0.0 };
            }
        } else {
            let uniform = 1.0 / self.regret.len() as f32;
            self.profile.iter_mut().for_each(|p| *p = uniform);
        }
    }

    /// The normalized, time-averaged strategy a driver should actually play
    /// from (CFR's convergence guarantee is about this average, not the
    /// instantaneous `profile`).
    pub fn average_strategy(&self) -> Vec<f32> {
        let mut average: Vec<f32> = self.strategy_sum.to_vec();
        crate::helpers::normalize(&mut average);
        average
    }
}
