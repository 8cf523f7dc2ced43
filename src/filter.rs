//! Action filter (component D): a pure, stateless whitelist over the
//! arbiter's legal actions, used to bound branching in the depth-limited
//! solver. Grounded in `training.py`'s `ActionsFilter`/`DirectionFilter`
//! and `CFRTrainingSimulator._get_actions_filter`.

use std::collections::HashSet;

use crate::board::{Action, Board, MoveOutcome};
use crate::geometry::{Color, Coord, COLUMNS, ROWS};

/// Which travel directions (relative to the mover's own side) an action is
/// allowed to take. `forward` is increasing row for BLUE, decreasing row
/// for RED; `left`/`right` are likewise side-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionFilter {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl Default for DirectionFilter {
    fn default() -> Self {
        DirectionFilter { forward: true, back: true, left: true, right: true }
    }
}

impl DirectionFilter {
    pub fn forward_only() -> Self {
        DirectionFilter { forward: true, back: false, left: false, right: false }
    }
}

/// A pure, stateless whitelist over `Board::actions()`. Preserves the
/// arbiter's action order so the solver can splice skipped actions back in
/// by index with utility 0 (§4.D).
pub struct ActionFilter {
    mover: Color,
    directions: DirectionFilter,
    whitelist: HashSet<Coord>,
}

impl ActionFilter {
    pub fn new(mover: Color, directions: DirectionFilter, whitelist: Vec<Coord>) -> Self {
        ActionFilter { mover, directions, whitelist: whitelist.into_iter().collect() }
    }

    /// Returns the sublist of `board.actions()` this filter admits,
    /// preserving order and relative indices.
    pub fn apply(&self, board: &Board) -> Vec<Action> {
        board.actions().into_iter().filter(|action| self.includes(action)).collect()
    }

    fn includes(&self, action: &Action) -> bool {
        if !self.whitelist.contains(&action.from) && !self.whitelist.contains(&action.to) {
            return false;
        }

        let row_increases = action.to.row > action.from.row;
        let row_decreases = action.to.row < action.from.row;
        let col_increases = action.to.col > action.from.col;
        let col_decreases = action.to.col < action.from.col;

        // BLUE's forward is increasing row, its right is decreasing column.
        let (forward, back, right, left) = match self.mover {
            Color::Blue => (row_increases, row_decreases, col_decreases, col_increases),
            Color::Red => (row_decreases, row_increases, col_increases, col_decreases),
        };

        (!forward || self.directions.forward)
            && (!back || self.directions.back)
            && (!left || self.directions.left)
            && (!right || self.directions.right)
    }
}

/// The special opening filter for the first two plies of a game: every
/// square is whitelisted, but only forward travel is admitted (an opening
/// bias toward advancing pieces).
pub fn opening_filter(board: &Board) -> ActionFilter {
    let whitelist: Vec<Coord> =
        (0..ROWS).flat_map(|row| (0..COLUMNS).map(move |col| Coord::new(row, col))).collect();
    ActionFilter::new(board.to_move, DirectionFilter::forward_only(), whitelist)
}

/// Resolves the center square for the radius filter: the previous action's
/// attack destination if it won or lost a clash, otherwise its source cell.
pub fn radius_center(previous_action: Action, previous_result: MoveOutcome) -> Coord {
    match previous_result {
        MoveOutcome::Win | MoveOutcome::Loss => previous_action.to,
        MoveOutcome::Draw | MoveOutcome::Occupy => previous_action.from,
    }
}

/// Builds a Chebyshev-ball action filter around `center`, growing the
/// radius from 2 until it admits at least one action. Always terminates:
/// the radius eventually covers the whole board, which the side to move
/// always has at least one legal action on.
pub fn radius_filter(board: &Board, center: Coord) -> ActionFilter {
    let mut radius = 1;
    loop {
        radius += 1;
        let whitelist = board.get_squares_within_radius(center, radius);
        let filter = ActionFilter::new(board.to_move, DirectionFilter::default(), whitelist);
        if !filter.apply(board).is_empty() {
            return filter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{empty_matrix, Action};
    use crate::geometry::{CAPTAIN, FLAG, RED_OFFSET};

    fn sample_board() -> Board {
        let mut matrix = empty_matrix();
        matrix[3][3] = CAPTAIN;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        Board::new(matrix, Color::Blue, false, false)
    }

    #[test]
    fn forward_only_excludes_backward_moves_for_blue() {
        let board = sample_board();
        let filter =
            ActionFilter::new(Color::Blue, DirectionFilter::forward_only(), board.get_squares_within_radius(Coord::new(3, 3), 1));
        let forward = Action::new(Coord::new(3, 3), Coord::new(4, 3));
        let backward = Action::new(Coord::new(3, 3), Coord::new(2, 3));
        assert!(filter.includes(&forward));
        assert!(!filter.includes(&backward));
    }

    #[test]
    fn opening_filter_whitelists_the_whole_board() {
        let board = sample_board();
        let filter = opening_filter(&board);
        let actions = filter.apply(&board);
        // CAPTAIN at (3,3) can only move forward (row+1), left, or right —
        // never backward — under the opening filter.
        assert!(actions.iter().all(|a| a.to.row >= a.from.row));
        assert!(!actions.is_empty());
    }

    #[test]
    fn radius_filter_grows_until_nonempty() {
        let board = sample_board();
        let filter = radius_filter(&board, Coord::new(3, 3));
        assert!(!filter.apply(&board).is_empty());
    }

    #[test]
    fn radius_center_uses_destination_on_win_or_loss() {
        let action = Action::new(Coord::new(1, 1), Coord::new(2, 1));
        assert_eq!(radius_center(action, MoveOutcome::Win), Coord::new(2, 1));
        assert_eq!(radius_center(action, MoveOutcome::Loss), Coord::new(2, 1));
        assert_eq!(radius_center(action, MoveOutcome::Occupy), Coord::new(1, 1));
    }
}
