#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// A move analysis suggests the move that was actually played, or its
    /// tier disagrees with its centipawn loss. Always a logic bug.
    #[error("contradictory analysis at ply {ply} ({played}): {detail}")]
    ClassificationInvariantViolation {
        ply: u32,
        played: String,
        detail: String,
    },
    #[error("analysis cancelled")]
    Cancelled,
}
