use analysis::AnalysisError;
use chess::{GameError, PgnError};

use crate::types::JobId;

/// Errors from the summary store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Game id cannot be used as a record name: {0:?}")]
    InvalidId(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Game {game_id}: invalid PGN: {source}")]
    Pgn {
        game_id: String,
        #[source]
        source: PgnError,
    },
    #[error("Game {game_id}: cannot replay: {source}")]
    Replay {
        game_id: String,
        #[source]
        source: GameError,
    },
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),
}
