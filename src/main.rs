//! Minimal binary entry point. The actual host CLI (argument parsing, exit
//! codes, the interactive match driver) is out of scope (§1 Non-goals) —
//! this just wires up logging and runs a handful of bounded self-play games
//! so the crate is runnable on its own, with a console progress bar over
//! the batch the way the teacher's own `train` entry point reports progress
//! over its iteration count.

use gg_solver::driver::{self, Game, GameTally};
use gg_solver::formation;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::prelude::*;

const GAMES: usize = 20;
const MAX_ROWS_PER_GAME: usize = 200;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let mut rng = rand::thread_rng();
    let progress = ProgressBar::new(GAMES as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .expect("template is a constant, always valid"),
    );

    let mut tally = GameTally::default();
    for _ in 0..GAMES {
        let blue_formation = formation::sample(&mut rng).expect("formation sampling should not be exhausted");
        let red_formation = formation::sample(&mut rng).expect("formation sampling should not be exhausted");

        let mut game = Game::new_game(&blue_formation, &red_formation, rand::random());
        let stats = driver::run(&mut game, MAX_ROWS_PER_GAME);
        tally += GameTally::from(&stats);
        progress.inc(1);
    }
    progress.finish_with_message("self-play batch finished");

    info!(
        games = tally.games,
        plies = tally.plies,
        repetition_draws = tally.repetition_draws,
        "self-play batch finished"
    );
}
