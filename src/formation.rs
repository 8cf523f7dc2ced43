//! Opening formation sampler (component H). Grounded in `core.py`'s
//! `get_random_permutation` (a Fisher-Yates shuffle of the 27-cell home-row
//! multiset) and `MatchSimulator._place_formation_on_matrix`/`_flip_matrix`
//! (front-row-first placement, mirrored between the two sides' home rows).
//!
//! The original's placement additionally mirrors BLUE's matrix left-to-right
//! as a side effect of reusing one placement routine for both colors; §4.H's
//! contract only asks for the row mirroring (front row nearest the enemy),
//! read left-to-right for both sides, so that's all this reproduces.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::TrainingError;
use crate::geometry::{Color, BLANK, COLUMNS, FLAG, INITIAL_PIECES, RED_OFFSET, ROWS};

/// Three home rows, nine columns: 21 ranks plus 6 blanks.
pub const FORMATION_CELLS: usize = 27;

const MAX_SAMPLING_ATTEMPTS: usize = 10_000;

/// A length-27 list of rank codes in `{0, 1..=15}` (§6 "Opening formation"):
/// index order is front row (nearest the enemy) first, then middle, then
/// the player's own back row, each read left to right.
pub type Formation = [u8; FORMATION_CELLS];

/// Draws a uniform random permutation of the 21 ranks plus 6 blanks,
/// rejecting and resampling while the FLAG lands in the front row (index
/// `0..COLUMNS`). Gives up after `MAX_SAMPLING_ATTEMPTS` rejections — with
/// 6 blanks among 27 cells the front-row-FLAG probability is under 9%, so
/// this should never be exhausted in practice.
pub fn sample<R: Rng>(rng: &mut R) -> Result<Formation, TrainingError> {
    let mut cells: Vec<u8> = INITIAL_PIECES.iter().copied().chain(std::iter::repeat(BLANK).take(6)).collect();
    debug_assert_eq!(cells.len(), FORMATION_CELLS);

    for _ in 0..MAX_SAMPLING_ATTEMPTS {
        cells.shuffle(rng);
        if !cells[0..COLUMNS].contains(&FLAG) {
            let mut formation = [0u8; FORMATION_CELLS];
            formation.copy_from_slice(&cells);
            return Ok(formation);
        }
    }
    Err(TrainingError::FormationSamplingExhausted)
}

/// Places one side's formation into an otherwise-blank arbiter matrix. The
/// front row is nearest the enemy — row 2 for BLUE (enemy at row 7), row 5
/// for RED (enemy at row 0) — with the middle and back rows following in
/// the order `Formation`'s doc comment describes.
pub fn place(matrix: &mut [[u8; COLUMNS]; ROWS], color: Color, formation: &Formation) {
    let rows = match color {
        Color::Blue => [2, 1, 0],
        Color::Red => [5, 6, 7],
    };
    let offset = match color {
        Color::Blue => 0,
        Color::Red => RED_OFFSET,
    };

    for (band, &row) in rows.iter().enumerate() {
        for col in 0..COLUMNS {
            let code = formation[band * COLUMNS + col];
            matrix[row][col] = if code == BLANK { BLANK } else { code + offset };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::empty_matrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sampled_formation_never_puts_the_flag_in_the_front_row() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let formation = sample(&mut rng).unwrap();
            assert!(!formation[0..COLUMNS].contains(&FLAG));
        }
    }

    #[test]
    fn sampled_formation_is_a_permutation_of_the_full_army_plus_blanks() {
        let mut rng = StdRng::seed_from_u64(7);
        let formation = sample(&mut rng).unwrap();
        let mut pieces: Vec<u8> = formation.iter().copied().filter(|&c| c != BLANK).collect();
        pieces.sort_unstable();
        let mut expected: Vec<u8> = INITIAL_PIECES.to_vec();
        expected.sort_unstable();
        assert_eq!(pieces, expected);
        assert_eq!(formation.iter().filter(|&&c| c == BLANK).count(), 6);
    }

    #[test]
    fn placement_keeps_each_side_on_its_own_home_rows() {
        let mut rng = StdRng::seed_from_u64(3);
        let blue = sample(&mut rng).unwrap();
        let red = sample(&mut rng).unwrap();
        let mut matrix = empty_matrix();
        place(&mut matrix, Color::Blue, &blue);
        place(&mut matrix, Color::Red, &red);

        for row in 3..5 {
            assert!(matrix[row].iter().all(|&c| c == BLANK), "no-man's-land rows must stay empty");
        }
        for row in 0..3 {
            assert!(matrix[row].iter().all(|&c| c == BLANK || c <= FLAG.max(crate::geometry::SPY)));
        }
        for row in 5..8 {
            assert!(matrix[row].iter().all(|&c| c == BLANK || c > crate::geometry::SPY));
        }
    }

    #[test]
    fn placement_preserves_front_row_ordering_left_to_right() {
        let mut formation = [BLANK; FORMATION_CELLS];
        formation[0] = crate::geometry::GENERAL;
        let mut matrix = empty_matrix();
        place(&mut matrix, Color::Blue, &formation);
        assert_eq!(matrix[2][0], crate::geometry::GENERAL);

        let mut matrix = empty_matrix();
        place(&mut matrix, Color::Red, &formation);
        assert_eq!(matrix[5][0], crate::geometry::GENERAL + RED_OFFSET);
    }
}
