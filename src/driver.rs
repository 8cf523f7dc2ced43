//! Self-play training driver (component G). Per ply: build the abstraction,
//! construct an action filter, call the solver, distill a move from the
//! accumulated strategy, apply it, emit a training row, and check for
//! repetition. Grounded in `original_source/training.py`'s
//! `CFRTrainingSimulator.start` for the control flow and
//! `CFRTrainingSimulator._distill_strategy`/`get_cfr_input` for the
//! strategy-to-row shape; the repetition detector and config structs are
//! this crate's own addition over the distilled contract (§9 EXPANSION).

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;

use derive_more::{Add, AddAssign, Sum};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::board::{Action, Board, MoveOutcome};
use crate::cfr::{Abstraction, Solver};
use crate::error::TrainingError;
use crate::filter::{self, ActionFilter};
use crate::formation::{self, Formation};
use crate::geometry::{Coord, COLUMNS, ROWS};
use crate::helpers;

/// Every orthogonal move on the board, cell by cell, in the same
/// up/down/left/right order `Board::actions` enumerates a single cell's
/// neighbors in (§4.G "Timeless action space"). Fixed across every game,
/// so training rows from different states remain directly comparable.
pub static TIMELESS_ACTION_SPACE: Lazy<Vec<Action>> = Lazy::new(|| {
    use itertools::Itertools;
    (0..ROWS)
        .cartesian_product(0..COLUMNS)
        .flat_map(|(row, col)| {
            let from = Coord::new(row, col);
            from.orthogonal_neighbors().into_iter().map(move |to| Action::new(from, to))
        })
        .collect()
});

/// `TIMELESS_ACTION_SPACE`'s length on an 8x9 board (§4.G).
pub const TIMELESS_ACTION_SPACE_SIZE: usize = 254;

static TIMELESS_ACTION_INDEX: Lazy<FxHashMap<Action, usize>> = Lazy::new(|| {
    TIMELESS_ACTION_SPACE.iter().enumerate().map(|(index, &action)| (action, index)).collect()
});

/// Tunable parameters for the CFR solver itself (§4.F), grounded in the
/// teacher's `TrainingOptions`/`CFRParameters` shape: small, `Copy`able
/// plain data rather than a parsed config file (no external config crate
/// the way the teacher carries none).
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub iterations: usize,
    pub depth: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig { iterations: 10, depth: 2 }
    }
}

/// Tunable parameters for the self-play driver (§4.G/§9 EXPANSION).
#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    pub solver: SolverConfig,
    /// Sliding window length `W` the repetition detector watches.
    pub repetition_window: usize,
    /// Repeat count `R` of an identical window that triggers a draw.
    pub repetition_threshold: u32,
    /// Bottom-`k` lowest-probability actions dropped before renormalizing
    /// the distilled strategy (§4.G step 4).
    pub bottom_k: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            solver: SolverConfig::default(),
            repetition_window: 6,
            repetition_threshold: 2,
            bottom_k: 3,
        }
    }
}

/// The first two plies of a game get the forward-only whole-board opening
/// filter (§4.D/§4.G) instead of a radius filter.
const OPENING_PLIES: usize = 2;

/// One training example: an infostate's canonical key and the probability
/// distribution the driver actually chose its move from, mapped onto the
/// fixed `TIMELESS_ACTION_SPACE` (§3/§6 EXPANSION).
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub infostate_key: String,
    pub strategy: [f32; TIMELESS_ACTION_SPACE_SIZE],
}

impl TrainingRow {
    /// Writes this row as one CSV line: the infostate key's space-separated
    /// integers become individual columns, followed by the 254 strategy
    /// floats (§6 "Training row (CSV)"). No header, no trailing separator.
    pub fn write_csv_row<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut columns = self.infostate_key.split(' ');
        if let Some(first) = columns.next() {
            write!(writer, "{first}")?;
        }
        for column in columns {
            write!(writer, ",{column}")?;
        }
        for probability in self.strategy.iter() {
            write!(writer, ",{probability}")?;
        }
        writeln!(writer)
    }
}

/// Appends training rows to a CSV log on disk. The only persisted state
/// this crate defines (§6 "Persisted state"); the in-memory CFR tables are
/// not serialized.
pub struct TrainingLog {
    file: std::fs::File,
}

impl TrainingLog {
    pub fn create_or_append(path: &Path) -> Result<Self, TrainingError> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(TrainingLog { file })
    }

    pub fn append(&mut self, row: &TrainingRow) -> Result<(), TrainingError> {
        row.write_csv_row(&mut self.file)?;
        Ok(())
    }
}

/// One ply's outcome (§6 "Driver entry points").
#[derive(Debug, Clone)]
pub struct StepResult {
    pub chosen_action: Action,
    pub result: MoveOutcome,
    /// True once the game is over *after* this ply (terminal board or a
    /// repetition-draw just triggered).
    pub terminal: bool,
    pub training_row: TrainingRow,
}

/// A running self-play training game: arbiter board, both infostates, the
/// solver whose tables persist for this game's lifetime, the repetition
/// detector, and enough bookkeeping from the previous ply to build the next
/// action filter (§4.G).
pub struct Game {
    config: TrainingConfig,
    solver: Solver,
    rng: StdRng,
    abstraction: Abstraction,
    turn_number: usize,
    previous_action: Option<Action>,
    previous_result: Option<MoveOutcome>,
    history: VecDeque<Action>,
    window_counts: HashMap<Vec<Action>, u32>,
    repetition_draw: bool,
}

impl Game {
    /// `new_game(blue_formation, red_formation, seed) -> Game` (§6).
    pub fn new_game(blue_formation: &Formation, red_formation: &Formation, seed: u64) -> Game {
        Self::new_game_with_config(blue_formation, red_formation, seed, TrainingConfig::default())
    }

    pub fn new_game_with_config(
        blue_formation: &Formation,
        red_formation: &Formation,
        seed: u64,
        config: TrainingConfig,
    ) -> Game {
        let mut matrix = crate::board::empty_matrix();
        formation::place(&mut matrix, crate::geometry::Color::Blue, blue_formation);
        formation::place(&mut matrix, crate::geometry::Color::Red, red_formation);
        let board = Board::new(matrix, crate::geometry::Color::Blue, false, false);
        let abstraction = Abstraction::from_board(board);

        info!(seed, "starting a new training game");
        Game {
            config,
            solver: Solver::new(),
            rng: StdRng::seed_from_u64(seed),
            abstraction,
            turn_number: 1,
            previous_action: None,
            previous_result: None,
            history: VecDeque::with_capacity(config.repetition_window),
            window_counts: HashMap::new(),
            repetition_draw: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abstraction.board.is_terminal() || self.repetition_draw
    }

    pub fn ended_by_repetition(&self) -> bool {
        self.repetition_draw
    }

    /// Resolves the action filter for the upcoming ply (§4.G step 2): the
    /// opening filter for the first two plies, otherwise a radius filter
    /// centered on the previous ply's attack location, otherwise no filter
    /// (the very first ply of all, before any action has ever landed).
    fn current_filter(&self) -> Option<ActionFilter> {
        if self.turn_number <= OPENING_PLIES {
            return Some(filter::opening_filter(&self.abstraction.board));
        }
        match (self.previous_action, self.previous_result) {
            (Some(action), Some(result)) => {
                let center = filter::radius_center(action, result);
                Some(filter::radius_filter(&self.abstraction.board, center))
            }
            _ => None,
        }
    }

    /// Runs one ply: solve, distill a move, apply it, emit a training row,
    /// advance the repetition detector (§4.G steps 1-9).
    ///
    /// # Panics
    ///
    /// Panics if the game is already finished — callers must check
    /// `is_finished` first, the same contract `Board::transition` places on
    /// its own caller.
    pub fn step(&mut self) -> StepResult {
        debug_assert!(!self.is_finished(), "step() called on an already-finished game");

        let filter = self.current_filter();
        self.solver.solve(
            &self.abstraction,
            self.turn_number,
            self.config.solver.iterations,
            self.config.solver.depth,
            filter.as_ref(),
        );

        let actions = self.abstraction.board.actions();
        let key = self.abstraction.key();
        let mut strategy = match self.solver.node(&key) {
            Some(node) => node.average_strategy(),
            None => vec![1.0 / actions.len() as f32; actions.len()],
        };
        debug_assert_eq!(strategy.len(), actions.len());

        prune_bottom_k(&mut strategy, self.config.bottom_k);

        if let Some(filter) = &filter {
            let admitted = filter.apply(&self.abstraction.board);
            for (index, action) in actions.iter().enumerate() {
                if !admitted.contains(action) {
                    strategy[index] = 0.0;
                }
            }
            helpers::normalize(&mut strategy);
        }

        let chosen_index = helpers::argmax_random_tiebreak(&strategy, &mut self.rng);
        let chosen_action = actions[chosen_index];

        let next_board = self.abstraction.board.transition(chosen_action);
        let result = self.abstraction.board.classify_action_result(chosen_action, &next_board);
        let next_blue = self.abstraction.blue_infostate.transition(chosen_action, result);
        let next_red = self.abstraction.red_infostate.transition(chosen_action, result);
        self.abstraction = Abstraction { board: next_board, blue_infostate: next_blue, red_infostate: next_red };

        debug!(%chosen_action, ?result, turn = self.turn_number, "applied a training ply");

        self.previous_action = Some(chosen_action);
        self.previous_result = Some(result);
        self.turn_number += 1;

        self.advance_repetition_detector(chosen_action);

        let training_row =
            TrainingRow { infostate_key: key, strategy: to_timeless_vector(&actions, &strategy) };

        StepResult { chosen_action, result, terminal: self.is_finished(), training_row }
    }

    fn advance_repetition_detector(&mut self, action: Action) {
        self.history.push_back(action);
        if self.history.len() > self.config.repetition_window {
            self.history.pop_front();
        }
        if self.history.len() == self.config.repetition_window {
            let window: Vec<Action> = self.history.iter().copied().collect();
            let count = self.window_counts.entry(window).or_insert(0);
            *count += 1;
            if *count >= self.config.repetition_threshold {
                warn!("draw by repetition");
                self.repetition_draw = true;
            }
        }
    }
}

/// Drops the `k` lowest-probability entries of `strategy` and renormalizes
/// the rest (§4.G step 4). A no-op when `k` would empty the whole
/// distribution, since a strategy with no admitted action left is not a
/// valid distribution to choose from.
fn prune_bottom_k(strategy: &mut [f32], k: usize) {
    if k == 0 || k >= strategy.len() {
        return;
    }
    let mut indices: Vec<usize> = (0..strategy.len()).collect();
    indices.sort_by(|&a, &b| strategy[a].partial_cmp(&strategy[b]).expect("strategy entries are never NaN"));
    for &index in indices.iter().take(k) {
        strategy[index] = 0.0;
    }
    helpers::normalize(strategy);
}

/// Maps a per-state `(actions, strategy)` pair onto the fixed canonical
/// action space, zero-filling every move not legal in the current state
/// (§4.G "Timeless action space").
fn to_timeless_vector(actions: &[Action], strategy: &[f32]) -> [f32; TIMELESS_ACTION_SPACE_SIZE] {
    let mut dense = [0.0f32; TIMELESS_ACTION_SPACE_SIZE];
    for (action, &probability) in actions.iter().zip(strategy.iter()) {
        if let Some(&index) = TIMELESS_ACTION_INDEX.get(action) {
            dense[index] = probability;
        }
    }
    dense
}

/// Aggregate outcome of running a game to completion or to `target_rows`,
/// whichever comes first (§6 "Driver entry points").
#[derive(Debug, Default)]
pub struct Stats {
    pub plies_played: usize,
    pub terminal: bool,
    pub ended_by_repetition: bool,
    pub rows: Vec<TrainingRow>,
}

/// `run(Game, target_rows) -> Stats` (§6): steps `game` until it finishes
/// or `target_rows` training rows have been collected.
pub fn run(game: &mut Game, target_rows: usize) -> Stats {
    let mut stats = Stats::default();
    while stats.rows.len() < target_rows && !game.is_finished() {
        let step_result = game.step();
        stats.terminal = step_result.terminal;
        stats.rows.push(step_result.training_row);
    }
    stats.plies_played = stats.rows.len();
    stats.ended_by_repetition = game.ended_by_repetition();
    stats
}

/// A summable per-game tally, grounded in the teacher's `PhaseStats`
/// pattern (`derive_more`'s `Add`/`AddAssign`/`Sum`): a host running many
/// games back to back folds their `Stats` into one of these to report
/// aggregate progress, rather than keeping every game's full row buffer
/// around.
#[derive(Debug, Default, Clone, Copy, Add, AddAssign, Sum)]
pub struct GameTally {
    pub games: usize,
    pub plies: usize,
    pub repetition_draws: usize,
}

impl From<&Stats> for GameTally {
    fn from(stats: &Stats) -> Self {
        GameTally { games: 1, plies: stats.plies_played, repetition_draws: stats.ended_by_repetition as usize }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng as TestRng;
    use rand::SeedableRng as _;

    fn sample_formations(seed: u64) -> (Formation, Formation) {
        let mut rng = TestRng::seed_from_u64(seed);
        (formation::sample(&mut rng).unwrap(), formation::sample(&mut rng).unwrap())
    }

    #[test]
    fn timeless_action_space_has_the_contracted_size() {
        assert_eq!(TIMELESS_ACTION_SPACE.len(), TIMELESS_ACTION_SPACE_SIZE);
    }

    #[test]
    fn timeless_action_space_has_no_duplicate_actions() {
        let mut seen = std::collections::HashSet::new();
        assert!(TIMELESS_ACTION_SPACE.iter().all(|a| seen.insert(*a)));
    }

    #[test]
    fn prune_bottom_k_zeroes_the_lowest_entries_and_renormalizes() {
        let mut strategy = vec![0.4, 0.3, 0.2, 0.1];
        prune_bottom_k(&mut strategy, 2);
        assert_eq!(strategy[2], 0.0);
        assert_eq!(strategy[3], 0.0);
        let sum: f32 = strategy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn prune_bottom_k_is_a_no_op_when_k_would_empty_the_distribution() {
        let mut strategy = vec![0.5, 0.5];
        prune_bottom_k(&mut strategy, 2);
        assert_eq!(strategy, vec![0.5, 0.5]);
    }

    #[test]
    fn a_training_game_runs_to_completion_or_a_row_cap_without_panicking() {
        let (blue, red) = sample_formations(11);
        let mut game = Game::new_game(&blue, &red, 99);
        let stats = run(&mut game, 8);
        assert!(stats.rows.len() <= 8);
        assert!(stats.rows.iter().all(|row| row.strategy.iter().all(|&p| p >= 0.0)));
    }

    #[test]
    fn two_games_from_identical_formations_and_seed_choose_identical_actions() {
        let (blue, red) = sample_formations(5);
        let mut game_a = Game::new_game(&blue, &red, 123);
        let mut game_b = Game::new_game(&blue, &red, 123);
        let stats_a = run(&mut game_a, 6);
        let stats_b = run(&mut game_b, 6);
        let actions_a: Vec<_> = stats_a.rows.iter().map(|r| r.infostate_key.clone()).collect();
        let actions_b: Vec<_> = stats_b.rows.iter().map(|r| r.infostate_key.clone()).collect();
        assert_eq!(actions_a, actions_b);
    }

    #[test]
    fn game_tallies_sum_across_several_runs() {
        let (blue, red) = sample_formations(2);
        let mut game_a = Game::new_game(&blue, &red, 1);
        let mut game_b = Game::new_game(&blue, &red, 2);
        let stats_a = run(&mut game_a, 4);
        let stats_b = run(&mut game_b, 4);

        let total: GameTally = [GameTally::from(&stats_a), GameTally::from(&stats_b)].into_iter().sum();
        assert_eq!(total.games, 2);
        assert_eq!(total.plies, stats_a.plies_played + stats_b.plies_played);
    }

    #[test]
    fn training_row_csv_splits_the_infostate_key_into_columns() {
        let row = TrainingRow { infostate_key: "1 2 3".to_string(), strategy: [0.0; TIMELESS_ACTION_SPACE_SIZE] };
        let mut buffer = Vec::new();
        row.write_csv_row(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("1,2,3,"));
    }
}
