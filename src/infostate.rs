//! Per-player obscured board (component C). Derived from, and never
//! authoritative over, the arbiter `Board` (§3 "Ownership").
//!
//! Tightening an opponent piece's rank range from an observed clash result
//! is the one place this module departs from a literal port of the
//! original prototype's per-piece-index bookkeeping (`infostate_logic.py`'s
//! `private_observation`): here the range lives directly on the cell the
//! piece occupies, which is simpler to keep consistent with the arbiter and
//! is what the rest of this crate (and the training row's wire format,
//! §6) is built around.

use std::fmt;

use crate::board::{Action, Board, MoveOutcome};
use crate::geometry::{color_of, true_rank, Color, Coord, COLUMNS, FLAG, PRIVATE, ROWS, SPY};

/// One cell's knowledge from an infostate owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoPiece {
    pub color: Color,
    pub rank_low: u8,
    pub rank_high: u8,
}

impl InfoPiece {
    fn known(color: Color, rank: u8) -> Self {
        InfoPiece { color, rank_low: rank, rank_high: rank }
    }

    fn unknown(color: Color) -> Self {
        InfoPiece { color, rank_low: FLAG, rank_high: SPY }
    }

    pub fn identified(&self) -> bool {
        self.rank_low == self.rank_high
    }
}

/// A player's obscured view of the board: their own pieces are fully
/// identified, the opponent's are rank-range intervals that only tighten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infostate {
    pub owner: Color,
    cells: [[Option<InfoPiece>; COLUMNS]; ROWS],
    pub to_move: Color,
    pub anticipating: bool,
}

impl Infostate {
    /// Builds `owner`'s obscured view of a fresh or mid-game arbiter board.
    pub fn from_board(board: &Board, owner: Color) -> Infostate {
        let mut cells: [[Option<InfoPiece>; COLUMNS]; ROWS] = [[None; COLUMNS]; ROWS];
        for row in 0..ROWS {
            for col in 0..COLUMNS {
                let coord = Coord::new(row, col);
                let code = board.get(coord);
                cells[row][col] = color_of(code).map(|color| {
                    if color == owner {
                        InfoPiece::known(color, true_rank(code))
                    } else {
                        InfoPiece::unknown(color)
                    }
                });
            }
        }

        Infostate {
            owner,
            cells,
            to_move: board.to_move,
            anticipating: match owner {
                Color::Blue => board.blue_anticipating,
                Color::Red => board.red_anticipating,
            },
        }
    }

    pub fn get(&self, at: Coord) -> Option<InfoPiece> {
        self.cells[at.row][at.col]
    }

    fn set(&mut self, at: Coord, piece: Option<InfoPiece>) {
        self.cells[at.row][at.col] = piece;
    }

    /// Tightens an unknown piece's range given it is known to have won or
    /// lost a clash against a piece of (fully identified) rank `known_rank`.
    ///
    /// The same collapse table is applied whether the unknown piece was
    /// attacker or defender: only "did the unknown piece win or lose"
    /// matters, mirroring the spy/private inversion symmetrically for both
    /// roles rather than tracking attacker/defender separately. The two
    /// inversion edges are each one-directional: beating a SPY only ever
    /// identifies a PRIVATE, and losing to a PRIVATE only ever identifies a
    /// SPY — every other rank follows the plain "strictly stronger/weaker"
    /// comparison, including a won clash against a PRIVATE (any of
    /// `known_rank+1..=SPY` can win there, not just the SPY).
    fn tighten(low: u8, high: u8, known_rank: u8, unknown_won: bool) -> (u8, u8) {
        if unknown_won {
            if known_rank == SPY {
                (PRIVATE, PRIVATE)
            } else {
                (low.max(known_rank + 1), high)
            }
        } else if known_rank == PRIVATE {
            (SPY, SPY)
        } else {
            (low, high.min(known_rank.saturating_sub(1)))
        }
    }

    /// Advances this infostate by the same `(action, result)` the arbiter
    /// observed. `result` — not a locally recomputed clash — is the only
    /// source of truth here, since an unidentified opponent piece's rank
    /// can't be recomputed from this view alone.
    pub fn transition(&self, action: Action, result: MoveOutcome) -> Infostate {
        let mut next = self.clone();
        let attacker = self.get(action.from);
        let defender = self.get(action.to);

        let (new_attacker, new_defender) = match result {
            MoveOutcome::Occupy => (attacker, defender),
            MoveOutcome::Draw => {
                let a = attacker.unwrap();
                let d = defender.unwrap();
                let k = if a.color == self.owner { a.rank_low } else { d.rank_low };
                (
                    Some(Self::collapse_to(a, k)),
                    Some(Self::collapse_to(d, k)),
                )
            }
            MoveOutcome::Win | MoveOutcome::Loss => {
                let a = attacker.unwrap();
                let d = defender.unwrap();
                let attacker_won = result == MoveOutcome::Win;
                let new_a = Self::tighten_piece(a, d, attacker_won, self.owner);
                let new_d = Self::tighten_piece(d, a, !attacker_won, self.owner);
                (Some(new_a), Some(new_d))
            }
        };

        match result {
            MoveOutcome::Draw => {
                next.set(action.from, None);
                next.set(action.to, None);
            }
            MoveOutcome::Win | MoveOutcome::Occupy => {
                next.set(action.to, new_attacker);
                next.set(action.from, None);
            }
            MoveOutcome::Loss => {
                next.set(action.from, None);
                next.set(action.to, new_defender);
            }
        }

        next.to_move = self.to_move.opponent();
        next.anticipating = next.is_own_flag_unchallenged();
        next
    }

    /// If `piece` belongs to this infostate's owner it is already fully
    /// identified and returned unchanged; otherwise its range is tightened
    /// against the known rank of `counterpart` (which must belong to the
    /// owner, since a clash always pairs one piece of each color).
    fn tighten_piece(piece: InfoPiece, counterpart: InfoPiece, won: bool, owner: Color) -> InfoPiece {
        if piece.color == owner || piece.identified() {
            return piece;
        }
        debug_assert_eq!(counterpart.color, owner, "a clash always pairs one piece of each color");
        debug_assert!(counterpart.identified(), "the owner's own piece must always be identified");
        let (low, high) = Self::tighten(piece.rank_low, piece.rank_high, counterpart.rank_low, won);
        InfoPiece { rank_low: low, rank_high: high, ..piece }
    }

    fn collapse_to(piece: InfoPiece, rank: u8) -> InfoPiece {
        InfoPiece { rank_low: rank, rank_high: rank, ..piece }
    }

    fn flag_at_opposite_end_row(&self) -> Option<Coord> {
        let target_row = match self.owner {
            Color::Blue => ROWS - 1,
            Color::Red => 0,
        };
        (0..COLUMNS)
            .map(|col| Coord::new(target_row, col))
            .find(|&coord| matches!(self.get(coord), Some(p) if p.color == self.owner && p.rank_low == FLAG && p.rank_high == FLAG))
    }

    fn is_own_flag_unchallenged(&self) -> bool {
        match self.flag_at_opposite_end_row() {
            None => false,
            Some(at) => {
                let neighbors = [at.col.checked_sub(1), (at.col + 1 < COLUMNS).then_some(at.col + 1)];
                neighbors.into_iter().flatten().all(|col| {
                    !matches!(self.get(Coord::new(at.row, col)), Some(p) if p.color != self.owner)
                })
            }
        }
    }

    /// Canonical serialization used as the sole identity for CFR table keys
    /// and as the training row's infostate column (§6): the 8x9 cells as
    /// `(color, rank_low, rank_high)` triples in row-major order, then
    /// to-move, then anticipating.
    pub fn serialize(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(ROWS * COLUMNS * 3 + 2);
        for row in 0..ROWS {
            for col in 0..COLUMNS {
                match self.cells[row][col] {
                    None => parts.extend(["0".into(), "0".into(), "0".into()]),
                    Some(piece) => {
                        let color_code = match piece.color {
                            Color::Blue => 1,
                            Color::Red => 2,
                        };
                        parts.push(color_code.to_string());
                        parts.push(piece.rank_low.to_string());
                        parts.push(piece.rank_high.to_string());
                    }
                }
            }
        }
        let to_move_code = match self.to_move {
            Color::Blue => 1,
            Color::Red => 2,
        };
        parts.push(to_move_code.to_string());
        parts.push((self.anticipating as u8).to_string());
        parts.join(" ")
    }
}

impl fmt::Display for Infostate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{empty_matrix, Action};
    use crate::geometry::{CAPTAIN, GENERAL, GENERAL_OF_THE_ARMY, RED_OFFSET};

    fn blue_private_vs_red_spy() -> (Board, Infostate, Infostate) {
        let mut matrix = empty_matrix();
        matrix[1][3] = crate::geometry::PRIVATE;
        matrix[2][3] = SPY + RED_OFFSET;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        let board = Board::new(matrix, Color::Blue, false, false);
        let blue_view = Infostate::from_board(&board, Color::Blue);
        let red_view = Infostate::from_board(&board, Color::Red);
        (board, blue_view, red_view)
    }

    // S1 — PRIVATE beats SPY: both infostates must agree on the outcome.
    #[test]
    fn s1_private_beats_spy_tightens_red_view() {
        let (board, blue_view, red_view) = blue_private_vs_red_spy();
        let action = Action::parse("1323").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);

        let blue_next = blue_view.transition(action, result);
        let moved = blue_next.get(Coord::new(2, 3)).unwrap();
        assert_eq!(moved.color, Color::Blue);
        assert_eq!((moved.rank_low, moved.rank_high), (crate::geometry::PRIVATE, crate::geometry::PRIVATE));

        let red_next = red_view.transition(action, result);
        let identified_attacker = red_next.get(Coord::new(2, 3)).unwrap();
        assert_eq!(identified_attacker.color, Color::Blue);
        assert_eq!(
            (identified_attacker.rank_low, identified_attacker.rank_high),
            (crate::geometry::PRIVATE, crate::geometry::PRIVATE)
        );
        assert!(red_next.get(Coord::new(1, 3)).is_none());
    }

    #[test]
    fn identified_rank_never_widens_back_out() {
        let (board, _, red_view) = blue_private_vs_red_spy();
        let action = Action::parse("1323").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        let red_next = red_view.transition(action, result);

        let piece = red_next.get(Coord::new(2, 3)).unwrap();
        assert!(piece.identified());
        assert_eq!(piece.rank_high - piece.rank_low, 0);
    }

    #[test]
    fn own_pieces_are_always_fully_identified_on_construction() {
        let (_, blue_view, _) = blue_private_vs_red_spy();
        let own = blue_view.get(Coord::new(1, 3)).unwrap();
        assert!(own.identified());
    }

    #[test]
    fn unknown_enemy_piece_starts_at_full_range() {
        let (_, blue_view, _) = blue_private_vs_red_spy();
        let enemy = blue_view.get(Coord::new(2, 3)).unwrap();
        assert_eq!((enemy.rank_low, enemy.rank_high), (FLAG, SPY));
    }

    #[test]
    fn draw_collapses_both_sides_to_the_observed_rank() {
        let mut matrix = empty_matrix();
        matrix[4][4] = CAPTAIN;
        matrix[4][5] = CAPTAIN + RED_OFFSET;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        let board = Board::new(matrix, Color::Blue, false, false);
        let red_view = Infostate::from_board(&board, Color::Red);

        let action = Action::parse("4445").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        let red_next = red_view.transition(action, result);

        assert!(red_next.get(Coord::new(4, 4)).is_none());
        assert!(red_next.get(Coord::new(4, 5)).is_none());
    }

    #[test]
    fn loss_tightens_attacker_upper_bound_from_defenders_view() {
        let mut matrix = empty_matrix();
        matrix[4][4] = crate::geometry::PRIVATE;
        matrix[4][5] = GENERAL + RED_OFFSET;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        let board = Board::new(matrix, Color::Blue, false, false);
        let red_view = Infostate::from_board(&board, Color::Red);

        let action = Action::parse("4445").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        let red_next = red_view.transition(action, result);

        let attacker_view = red_next.get(Coord::new(4, 5)).unwrap();
        assert_eq!(attacker_view.color, Color::Blue);
        assert!(attacker_view.rank_high < GENERAL);
    }

    // Direct coverage of `tighten`'s two inversion edges and the ordinary
    // win-against-PRIVATE case that must NOT be treated as an inversion.

    #[test]
    fn tighten_win_against_private_only_raises_the_low_bound() {
        // An unknown attacker that beats a PRIVATE can be any of
        // SERGEANT..=SPY (3..=15), not just the SPY — PRIVATE only inverts
        // against a SPY *defender*, not an attacker beating a PRIVATE.
        assert_eq!(Infostate::tighten(FLAG, SPY, PRIVATE, true), (3, SPY));
    }

    #[test]
    fn tighten_win_against_spy_collapses_to_private() {
        assert_eq!(Infostate::tighten(FLAG, SPY, SPY, true), (PRIVATE, PRIVATE));
    }

    #[test]
    fn tighten_loss_against_private_collapses_to_spy() {
        // The only piece that loses to a PRIVATE as attacker is the SPY
        // (the inversion), so this must identify the SPY exactly.
        assert_eq!(Infostate::tighten(FLAG, SPY, PRIVATE, false), (SPY, SPY));
    }

    #[test]
    fn tighten_loss_against_spy_does_not_raise_the_low_bound() {
        // FLAG also loses to a SPY as attacker (ordinary comparison, not an
        // inversion), so the low bound must stay at FLAG, not be raised.
        assert_eq!(Infostate::tighten(FLAG, SPY, SPY, false), (FLAG, GENERAL_OF_THE_ARMY));
    }

    #[test]
    fn win_against_identified_private_keeps_the_true_rank_in_range() {
        // An unidentified BLUE CAPTAIN beats a known RED PRIVATE; from
        // RED's view the attacker's range must still contain CAPTAIN (6),
        // not collapse to SPY.
        let mut matrix = empty_matrix();
        matrix[4][4] = CAPTAIN;
        matrix[4][5] = crate::geometry::PRIVATE + RED_OFFSET;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        let board = Board::new(matrix, Color::Blue, false, false);
        let red_view = Infostate::from_board(&board, Color::Red);

        let action = Action::parse("4445").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        let red_next = red_view.transition(action, result);

        let attacker_view = red_next.get(Coord::new(4, 5)).unwrap();
        assert!(attacker_view.rank_low <= CAPTAIN && CAPTAIN <= attacker_view.rank_high);
        assert_ne!((attacker_view.rank_low, attacker_view.rank_high), (SPY, SPY));
    }

    #[test]
    fn surviving_defender_beating_a_known_private_keeps_its_true_rank_in_range() {
        // BLUE's own (identified) PRIVATE attacks an unidentified RED piece
        // and loses — the RED piece is a CAPTAIN, which simply outranks a
        // PRIVATE under the ordinary comparison, no inversion involved.
        // From BLUE's view the surviving RED defender's range must still
        // contain CAPTAIN (6), not collapse to SPY the way the old
        // PRIVATE-special-case in the won branch would have forced.
        let mut matrix = empty_matrix();
        matrix[4][4] = crate::geometry::PRIVATE;
        matrix[4][5] = CAPTAIN + RED_OFFSET;
        matrix[0][0] = FLAG;
        matrix[7][8] = FLAG + RED_OFFSET;
        let board = Board::new(matrix, Color::Blue, false, false);
        let blue_view = Infostate::from_board(&board, Color::Blue);

        let action = Action::parse("4445").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        assert_eq!(result, MoveOutcome::Loss);
        let blue_next = blue_view.transition(action, result);

        let defender_view = blue_next.get(Coord::new(4, 5)).unwrap();
        assert!(defender_view.rank_low <= CAPTAIN && CAPTAIN <= defender_view.rank_high);
        assert_ne!((defender_view.rank_low, defender_view.rank_high), (SPY, SPY));
    }

    #[test]
    fn serialize_is_deterministic_for_equal_states() {
        let (_, blue_view, _) = blue_private_vs_red_spy();
        assert_eq!(blue_view.serialize(), blue_view.clone().serialize());
    }

    #[test]
    fn to_move_flips_on_transition() {
        let (board, blue_view, _) = blue_private_vs_red_spy();
        let action = Action::parse("1323").unwrap();
        let next_board = board.transition(action);
        let result = board.classify_action_result(action, &next_board);
        assert_eq!(blue_view.transition(action, result).to_move, Color::Red);
    }
}
