//! Recoverable failure modes (see §7 of the spec). Programming errors —
//! illegal actions, corrupt infostates, table-key collisions — are never
//! represented here; they are `panic!`/`debug_assert!` at the call site,
//! the same way the teacher's own `cfr::context::Context::cfr` panics on an
//! unreachable game-tree state rather than threading a `Result` through
//! callers that can never meaningfully recover from it.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum TrainingError {
    /// The opening formation sampler gave up before finding a legal
    /// placement. Should not happen in practice (see `formation::sample`),
    /// but is surfaced rather than looping forever.
    FormationSamplingExhausted,
    /// Writing a training row to the log failed.
    RowIo(io::Error),
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::FormationSamplingExhausted => {
                write!(f, "illegal opening formation rejected too many times in a row")
            }
            TrainingError::RowIo(err) => write!(f, "training row I/O failure: {err}"),
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::RowIo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainingError {
    fn from(err: io::Error) -> Self {
        TrainingError::RowIo(err)
    }
}
