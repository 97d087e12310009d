use thiserror::Error;

use crate::validation::Violation;

/// Fatal engine failures. Seeing one of these means the engine itself is wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invariant violated ({rule}): {detail}")]
    InvariantViolation { rule: &'static str, detail: String },
}

/// Failures of the roster source or the timetable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} '{name}' already exists")]
    Duplicate { kind: &'static str, name: String },

    #[error("timetable entry {0} not found")]
    NotFound(u64),

    #[error("entry set rejected: {}", summarize(.0))]
    Conflict(Vec<Violation>),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn summarize(violations: &[Violation]) -> String {
    match violations {
        [] => "no violations recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

/// Why a generation request produced no new grid.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("a timetable generation run is already in progress")]
    RunInProgress,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
