//! The arbiter board (component B): full-information state, legal action
//! enumeration, transition, terminality and reward.
//!
//! The arbiter is the single authority on piece positions (§3 "Ownership");
//! every other view (infostate, abstraction) is derived from it and must
//! never mutate it in place.

use std::fmt;

use tracing::{debug, trace};

use crate::geometry::{
    clash, color_of, true_rank, ClashOutcome, Color, Coord, BLANK, COLUMNS, FLAG, RED_OFFSET,
    ROWS,
};

/// Large terminal reward magnitude, signed from BLUE's perspective. Chosen
/// far larger than any plausible heuristic evaluation (§4.E's boundedness
/// invariant) so a genuine terminal state always dominates a heuristic one.
pub const WIN_MAGNITUDE: f32 = 1000.0;

/// A 4-digit action encoding `r1c1r2c2`: source and destination cells,
/// always orthogonally adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    pub from: Coord,
    pub to: Coord,
}

impl Action {
    pub fn new(from: Coord, to: Coord) -> Self {
        Action { from, to }
    }

    /// Parses a 4-digit action string. Returns `None` if the string is not
    /// exactly four ASCII digits.
    pub fn parse(encoded: &str) -> Option<Action> {
        let digits: Vec<usize> = encoded
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as usize))
            .collect::<Option<Vec<_>>>()?;
        if digits.len() != 4 {
            return None;
        }
        Some(Action::new(
            Coord::new(digits[0], digits[1]),
            Coord::new(digits[2], digits[3]),
        ))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.from.row, self.from.col, self.to.row, self.to.col)
    }
}

/// The outcome of resolving one action against the board it was taken from.
/// Named `MoveOutcome` (rather than `Result`) to avoid colliding with
/// `std::result::Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Draw,
    Win,
    Occupy,
    Loss,
}

/// Full-information board state: the flat 8x9 rank matrix plus the three
/// flags describing whose move it is and whether either flag is in its
/// one-ply grace period at the opposite end row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    matrix: [[u8; COLUMNS]; ROWS],
    pub to_move: Color,
    pub blue_anticipating: bool,
    pub red_anticipating: bool,
}

impl Board {
    pub fn new(
        matrix: [[u8; COLUMNS]; ROWS],
        to_move: Color,
        blue_anticipating: bool,
        red_anticipating: bool,
    ) -> Self {
        Board {
            matrix,
            to_move,
            blue_anticipating,
            red_anticipating,
        }
    }

    pub fn get(&self, at: Coord) -> u8 {
        self.matrix[at.row][at.col]
    }

    fn set(&mut self, at: Coord, value: u8) {
        self.matrix[at.row][at.col] = value;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8; COLUMNS]> {
        self.matrix.iter()
    }

    /// Finds the single occupied cell holding `code`, if any.
    fn find(&self, code: u8) -> Option<Coord> {
        for row in 0..ROWS {
            for col in 0..COLUMNS {
                if self.matrix[row][col] == code {
                    return Some(Coord::new(row, col));
                }
            }
        }
        None
    }

    fn flag_code(color: Color) -> u8 {
        match color {
            Color::Blue => FLAG,
            Color::Red => FLAG + RED_OFFSET,
        }
    }

    /// The row a `color`'s flag must reach (and survive) to win by advance.
    fn opposite_end_row(color: Color) -> usize {
        match color {
            Color::Blue => ROWS - 1,
            Color::Red => 0,
        }
    }

    fn flag_at_opposite_end_row(&self, color: Color) -> Option<Coord> {
        let target_row = Self::opposite_end_row(color);
        let flag = Self::flag_code(color);
        (0..COLUMNS)
            .map(|col| Coord::new(target_row, col))
            .find(|&coord| self.get(coord) == flag)
    }

    /// True iff neither immediate left/right neighbor of `at` (on its own
    /// row) holds an enemy of `color`.
    fn no_adjacent_enemy(&self, color: Color, at: Coord) -> bool {
        let neighbors: [Option<usize>; 2] = [
            at.col.checked_sub(1),
            if at.col + 1 < COLUMNS { Some(at.col + 1) } else { None },
        ];
        neighbors.into_iter().flatten().all(|col| {
            let cell = self.matrix[at.row][col];
            color_of(cell) != Some(color.opponent())
        })
    }

    fn is_anticipating_now(&self, color: Color) -> bool {
        match self.flag_at_opposite_end_row(color) {
            Some(coord) => self.no_adjacent_enemy(color, coord),
            None => false,
        }
    }

    /// Enumerates every legal action for the side to move, in the
    /// contractually stable row-major / up-down-left-right order that
    /// defines the index layout of the CFR regret/strategy/profile vectors
    /// (§4.B).
    pub fn actions(&self) -> Vec<Action> {
        let mover = self.to_move;
        let mut moves = Vec::new();

        for row in 0..ROWS {
            for col in 0..COLUMNS {
                let from = Coord::new(row, col);
                let piece = self.get(from);
                if color_of(piece) != Some(mover) {
                    continue;
                }
                for to in ordered_neighbors(from) {
                    let target = self.get(to);
                    if color_of(target) != Some(mover) {
                        moves.push(Action::new(from, to));
                    }
                }
            }
        }

        moves
    }

    /// Applies `action`, producing the next board. Never mutates `self`.
    ///
    /// # Panics
    ///
    /// Panics if `action` is not legal for the side to move — an illegal
    /// action is a programming error upstream, not a recoverable condition
    /// (§7).
    pub fn transition(&self, action: Action) -> Board {
        let mover = self.to_move;
        let attacker_code = self.get(action.from);
        let target_code = self.get(action.to);

        assert_eq!(
            color_of(attacker_code),
            Some(mover),
            "illegal action {action}: source square is not an allied piece"
        );
        assert_ne!(
            color_of(target_code),
            Some(mover),
            "illegal action {action}: destination square is allied"
        );

        let mut next = self.clone();
        next.to_move = mover.opponent();

        if target_code == BLANK {
            next.set(action.to, attacker_code);
            next.set(action.from, BLANK);
        } else {
            let attacker_rank = true_rank(attacker_code);
            let defender_rank = true_rank(target_code);
            match clash(attacker_rank, defender_rank) {
                ClashOutcome::AttackerWins => {
                    next.set(action.to, attacker_code);
                    next.set(action.from, BLANK);
                }
                ClashOutcome::DefenderWins => {
                    next.set(action.from, BLANK);
                }
                ClashOutcome::Draw => {
                    next.set(action.from, BLANK);
                    next.set(action.to, BLANK);
                }
            }
        }

        next.blue_anticipating = next.is_anticipating_now(Color::Blue);
        next.red_anticipating = next.is_anticipating_now(Color::Red);

        trace!(%action, ?mover, "applied transition");
        next
    }

    /// Classifies the result of `action` by differencing `self` (the board
    /// before the action) against `next`, so callers never have to
    /// re-derive the clash logic themselves (§4.B).
    pub fn classify_action_result(&self, action: Action, next: &Board) -> MoveOutcome {
        let attacker = self.get(action.from);
        let target = self.get(action.to);
        let was_empty = target == BLANK;

        let source_diff = attacker.wrapping_sub(next.get(action.from));
        let dest_diff = target.wrapping_sub(next.get(action.to));

        debug_assert_eq!(
            source_diff, attacker,
            "corrupt transition: source square of a legal action must always empty out"
        );

        if dest_diff == target {
            MoveOutcome::Draw
        } else if dest_diff == 0 {
            MoveOutcome::Loss
        } else if was_empty {
            MoveOutcome::Occupy
        } else {
            MoveOutcome::Win
        }
    }

    fn flag_missing(&self, color: Color) -> bool {
        self.find(Self::flag_code(color)).is_none()
    }

    /// Terminal iff a flag has been captured, or the side to move's own
    /// flag has survived a full unchallenged round at the opposite end row
    /// (the "anticipating" grace period, §3/§4.B, consumed here: the bit is
    /// only acted on once play has returned to its owner).
    pub fn is_terminal(&self) -> bool {
        if self.flag_missing(Color::Blue) || self.flag_missing(Color::Red) {
            return true;
        }

        match self.to_move {
            Color::Blue => {
                self.blue_anticipating && self.flag_at_opposite_end_row(Color::Blue).is_some()
            }
            Color::Red => {
                self.red_anticipating && self.flag_at_opposite_end_row(Color::Red).is_some()
            }
        }
    }

    /// Terminal payoff signed from BLUE's perspective, in `{-W, 0, +W}`.
    ///
    /// # Panics
    ///
    /// Panics if called on a non-terminal state.
    pub fn reward(&self) -> f32 {
        assert!(self.is_terminal(), "reward() called on a non-terminal board");

        if self.flag_missing(Color::Blue) {
            return -WIN_MAGNITUDE;
        }
        if self.flag_missing(Color::Red) {
            return WIN_MAGNITUDE;
        }
        match self.to_move {
            Color::Blue => WIN_MAGNITUDE,
            Color::Red => -WIN_MAGNITUDE,
        }
    }

    /// Chebyshev ball of board coordinates around `center`, used by the
    /// action filter (component D) for search pruning.
    pub fn get_squares_within_radius(&self, center: Coord, radius: usize) -> Vec<Coord> {
        use itertools::Itertools;
        (0..ROWS)
            .cartesian_product(0..COLUMNS)
            .map(|(row, col)| Coord::new(row, col))
            .filter(|&candidate| center.chebyshev_distance(candidate) <= radius)
            .collect()
    }

    /// Renders the board for debug logging; identities are fully visible
    /// (world point of view). Not used for any interactive rendering.
    pub fn debug_render(&self) -> String {
        let mut out = String::new();
        for row in self.matrix.iter() {
            for &cell in row {
                out.push_str(&format!("{cell:>3}"));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.debug_render())
    }
}

fn ordered_neighbors(from: Coord) -> Vec<Coord> {
    let (row, col) = (from.row as isize, from.col as isize);
    // up, down, left, right — the stable order §4.B's contract is built on.
    let candidates = [(row - 1, col), (row + 1, col), (row, col - 1), (row, col + 1)];
    candidates
        .into_iter()
        .filter(|&(r, c)| Coord::in_bounds(r, c))
        .map(|(r, c)| Coord::new(r as usize, c as usize))
        .collect()
}

/// A blank 8x9 matrix, the starting point for both the formation sampler's
/// placement and test fixtures throughout this crate.
pub fn empty_matrix() -> [[u8; COLUMNS]; ROWS] {
    [[BLANK; COLUMNS]; ROWS]
}
