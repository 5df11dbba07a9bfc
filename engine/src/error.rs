use std::time::Duration;

/// Failures of the position evaluator and the pool that hands it out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine process could not be started or stopped responding.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// The time budget ran out before the engine reported any score.
    #[error("engine produced no result within {0:?}")]
    Timeout(Duration),
    /// No evaluator became free within the pool's acquire timeout.
    #[error("no evaluator available after waiting {0:?}")]
    PoolExhausted(Duration),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    /// Whether trying the same evaluation again later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout(_) | Self::PoolExhausted(_)
        )
    }

    /// Whether the evaluator that produced this error should be thrown away
    /// rather than returned to the pool.
    pub fn poisons_evaluator(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Protocol(_))
    }
}
