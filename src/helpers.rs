use rand::Rng;

/// Inline capacity for the CFR node's per-action vectors (`cfr::node::Node`):
/// most GG infostates have well under this many legal actions, so the
/// common case never spills to the heap. Matches the teacher's own
/// `helpers::VEC_SIZE` used the same way for its `SmallVec` node fields.
pub const VEC_SIZE: usize = 16;

/// Normalize a slice of non-negative weights into a probability distribution.
/// If every entry is zero (or the slice is empty), falls back to uniform.
pub fn normalize(weights: &mut [f32]) {
    let sum: f32 = weights.iter().sum();
    let size = weights.len();

    for weight in weights {
        if sum > 0.0 {
            *weight /= sum;
        } else if size > 0 {
            *weight = 1.0 / (size as f32);
        }
    }
}

/// Break ties uniformly at random among the indices attaining `key`'s maximum.
pub fn argmax_random_tiebreak<R: Rng>(values: &[f32], rng: &mut R) -> usize {
    let max = values
        .iter()
        .cloned()
        .fold(f32::NEG_INFINITY, f32::max);
    let candidates: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == max)
        .map(|(i, _)| i)
        .collect();
    candidates[rng.gen_range(0..candidates.len())]
}
