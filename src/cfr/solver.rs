//! Depth-limited CFR solver (component F). Grounded in the legacy
//! `train.rs`'s `Context`/`cfr` (an `FxHashMap`-backed node table and a
//! recursive best-response walk) generalized from that crate's
//! perfect-information card game to GG's imperfect-information search: the
//! walk below threads *both* players' infostates alongside the arbiter
//! board, and tables are keyed by the to-move player's infostate rather
//! than by a single shared history key. The recursion structure — reach
//! probabilities, regret updates gated on `to_move == perspective`, and a
//! per-call memoization cache — follows `original_source/training.py`'s
//! `DepthLimitedCFRTrainer.cfr`/`_depth_limited_utility`.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::board::{Action, Board, MoveOutcome};
use crate::cfr::node::Node;
use crate::filter::ActionFilter;
use crate::geometry::Color;
use crate::heuristic;
use crate::infostate::Infostate;

/// The pair `(arbiter board, one player's infostate)` the solver is handed
/// at the root of a search (§3 glossary). Internally the recursion also
/// carries the *other* player's infostate, since resolving whichever side
/// is to move at a deeper node requires that side's own view — both are
/// derived once, up front, from the always-fully-known arbiter board, then
/// evolved step for step exactly as the real driver evolves them (§4.G).
#[derive(Debug, Clone)]
pub struct Abstraction {
    pub board: Board,
    pub blue_infostate: Infostate,
    pub red_infostate: Infostate,
}

impl Abstraction {
    /// Builds an abstraction from a board alone, deriving both infostates
    /// fresh. Used at the start of a game and anywhere a solver needs to
    /// search from ground truth rather than from incrementally-tightened
    /// infostates.
    pub fn from_board(board: Board) -> Self {
        let blue_infostate = Infostate::from_board(&board, Color::Blue);
        let red_infostate = Infostate::from_board(&board, Color::Red);
        Abstraction { board, blue_infostate, red_infostate }
    }

    pub fn infostate_of(&self, color: Color) -> &Infostate {
        match color {
            Color::Blue => &self.blue_infostate,
            Color::Red => &self.red_infostate,
        }
    }

    /// The CFR table key for the side currently to move.
    pub fn key(&self) -> String {
        self.infostate_of(self.board.to_move).serialize()
    }

    /// Renders the board from `pov`, for `tracing::debug!` diagnostics only
    /// (§4.A's expanded contract). `World` delegates to the arbiter's own
    /// `Display`; `Blue`/`Red` print each cell's rank range from that
    /// player's infostate; `Blind` prints occupancy only.
    pub fn render(&self, pov: crate::geometry::Pov) -> String {
        use crate::geometry::Pov;
        match pov {
            Pov::World => self.board.debug_render(),
            Pov::Blue | Pov::Red => {
                let color = if pov == Pov::Blue { Color::Blue } else { Color::Red };
                let infostate = self.infostate_of(color);
                let mut out = String::new();
                for row in 0..crate::geometry::ROWS {
                    for col in 0..crate::geometry::COLUMNS {
                        let at = crate::geometry::Coord::new(row, col);
                        match infostate.get(at) {
                            None => out.push_str("  ."),
                            Some(piece) if piece.identified() => {
                                out.push_str(&format!("{:>3}", piece.rank_low))
                            }
                            Some(piece) => out.push_str(&format!(" {}-{}", piece.rank_low, piece.rank_high)),
                        }
                    }
                    out.push('\n');
                }
                out
            }
            Pov::Blind => {
                let mut out = String::new();
                for row in self.board.rows() {
                    for &cell in row {
                        out.push(if cell == crate::geometry::BLANK { '.' } else { '#' });
                    }
                    out.push('\n');
                }
                out
            }
        }
    }

    /// Applies `action` to the arbiter board and to both infostates in
    /// lockstep, exactly as the real driver does each real ply (§4.G step
    /// 7): the arbiter's `classify_action_result` is the single source of
    /// truth both infostates tighten against.
    fn step(&self, action: Action) -> (Abstraction, MoveOutcome) {
        let next_board = self.board.transition(action);
        let result = self.board.classify_action_result(action, &next_board);
        let next = Abstraction {
            blue_infostate: self.blue_infostate.transition(action, result),
            red_infostate: self.red_infostate.transition(action, result),
            board: next_board,
        };
        (next, result)
    }
}

/// Flips a BLUE-signed utility to `perspective`'s sign. Self-inverse: the
/// same call converts a `perspective`-signed value back to BLUE-signed.
fn sign_to(perspective: Color, blue_signed: f32) -> f32 {
    match perspective {
        Color::Blue => blue_signed,
        Color::Red => -blue_signed,
    }
}

/// Owns the persistent CFR tables (regret / strategy_sum / profile, one
/// `Node` per infostate key) across many `solve` calls — these accumulate
/// over the whole training run, the way the real algorithm's convergence
/// guarantee requires (§3 "Ownership": "the CFR tables are owned by the
/// solver and shared by reference with the driver for readout"). The
/// memoization cache, by contrast, is cleared at the top of every
/// iteration (§4.F step 3): it only bounds repeated recursion within a
/// single sweep over both perspectives, so each of `solve`'s `iterations`
/// actually walks the tree and re-accumulates regret/strategy from
/// scratch rather than short-circuiting at the root from iteration 2 on.
pub struct Solver {
    nodes: FxHashMap<String, Node>,
    memo: FxHashMap<(String, usize, Color), f32>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        Solver { nodes: FxHashMap::default(), memo: FxHashMap::default() }
    }

    /// Read-only access to an infostate's accumulated table, for the
    /// driver to distill a move from once `solve` returns.
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Runs `iterations` rounds of depth-limited CFR from `root`, once per
    /// perspective, updating the persistent node tables in place (§4.F).
    /// The memoization cache is cleared at the start of each iteration, so
    /// every iteration actually re-walks the tree and accumulates its own
    /// regret/strategy update instead of being memo-hit at the root by a
    /// prior iteration's cache. `turn_number` is the real game's ply count
    /// at `root`, used to decide whether the opening filter applies;
    /// `filter`, if given, bounds branching at every subsequent ply of the
    /// search the same way it bounds the real driver's next move.
    pub fn solve(
        &mut self,
        root: &Abstraction,
        turn_number: usize,
        iterations: usize,
        depth: usize,
        filter: Option<&ActionFilter>,
    ) {
        for iteration in 0..iterations {
            self.memo.clear();
            for perspective in [Color::Blue, Color::Red] {
                self.cfr(root, perspective, 1.0, 1.0, depth, turn_number, filter);
            }
            trace!(iteration, "completed a CFR sweep over both perspectives");
        }
    }

    /// The recursive depth-limited CFR walk (§4.F). Returns the utility of
    /// `node` signed to `perspective`. `pi_blue`/`pi_red` are each player's
    /// reach probability to `node` under the current profile.
    fn cfr(
        &mut self,
        node: &Abstraction,
        perspective: Color,
        pi_blue: f32,
        pi_red: f32,
        depth: usize,
        turn_number: usize,
        filter: Option<&ActionFilter>,
    ) -> f32 {
        let to_move = node.board.to_move;
        let key = node.infostate_of(to_move).serialize();

        // Steps 1-2: terminal and depth-0 horizon both short-circuit, and
        // are still cached under the same (key, depth, to_move) scheme as
        // an interior node would be.
        if node.board.is_terminal() {
            let blue_signed = node.board.reward();
            self.memo.insert((key, depth, to_move), blue_signed);
            return sign_to(perspective, blue_signed);
        }
        if depth == 0 {
            let blue_signed = heuristic::evaluate(&node.board);
            self.memo.insert((key, depth, to_move), blue_signed);
            return sign_to(perspective, blue_signed);
        }

        // Step 3: memoization lookup. The cache is keyed without a
        // perspective component (§3), so the stored value is always kept
        // BLUE-signed and converted at each use site — `sign_to` is its own
        // inverse, so the same helper both stores and reads.
        let memo_key = (key.clone(), depth, to_move);
        if let Some(&blue_signed) = self.memo.get(&memo_key) {
            return sign_to(perspective, blue_signed);
        }

        // Step 4: action enumeration, with the node table initialized to
        // the uniform profile the first time this infostate is seen.
        let actions = node.board.actions();
        {
            let table = self.nodes.entry(key.clone()).or_insert_with(|| Node::new(actions.len()));
            debug_assert_eq!(table.profile.len(), actions.len());
        }

        let admitted = self.admitted_actions(node, turn_number, filter);
        let profile = self.nodes.get(&key).expect("just inserted above").profile.clone();

        // Step 5-6: recurse into every admitted action, accumulating each
        // one's utility under the child's reach probabilities; a filtered-
        // out action contributes utility 0 without recursion.
        let mut utilities = vec![0.0f32; actions.len()];
        for (index, action) in actions.iter().enumerate() {
            if !admitted[index] {
                continue;
            }
            let (child, _result) = node.step(*action);
            let (child_pi_blue, child_pi_red) = match to_move {
                Color::Blue => (pi_blue * profile[index], pi_red),
                Color::Red => (pi_blue, pi_red * profile[index]),
            };
            utilities[index] =
                -self.cfr(&child, perspective, child_pi_blue, child_pi_red, depth - 1, turn_number + 1, filter);
        }

        let node_utility: f32 = profile.iter().zip(utilities.iter()).map(|(p, u)| p * u).sum();

        // Steps 7-8: regret and strategy_sum only accumulate on the ply
        // belonging to the perspective this walk is computing regret for;
        // the opponent's nodes are read-only from this walk's point of view.
        if to_move == perspective {
            let (pi_self, pi_opponent) = match perspective {
                Color::Blue => (pi_blue, pi_red),
                Color::Red => (pi_red, pi_blue),
            };
            let table = self.nodes.get_mut(&key).expect("node was just initialized above");
            for index in 0..actions.len() {
                table.regret[index] += pi_opponent * (utilities[index] - node_utility);
                table.strategy_sum[index] += pi_self * profile[index];
            }
            table.regret_match();
        }

        // Step 9: cache (BLUE-signed, per the scheme above) and return.
        self.memo.insert(memo_key, sign_to(perspective, node_utility));
        node_utility
    }

    /// Resolves which of `node.board.actions()` are admitted at this
    /// recursive step: the opening filter for the first two real plies,
    /// `filter` (if supplied) everywhere else, or everything if neither
    /// applies (§4.D/§4.F step 5).
    fn admitted_actions(&self, node: &Abstraction, turn_number: usize, filter: Option<&ActionFilter>) -> Vec<bool> {
        let actions = node.board.actions();
        let admitted: Vec<Action> = if turn_number == 1 || turn_number == 2 {
            crate::filter::opening_filter(&node.board).apply(&node.board)
        } else if let Some(filter) = filter {
            filter.apply(&node.board)
        } else {
            return vec![true; actions.len()];
        };
        actions.iter().map(|a| admitted.contains(a)).collect()
    }
}
