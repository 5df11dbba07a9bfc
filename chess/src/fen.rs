use cozy_chess::Board;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a Board
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let trimmed = fen.trim();
    if trimmed.split_whitespace().count() < 4 {
        return Err(FenError::InvalidFormat(fen.to_string()));
    }

    // Some sources omit the move counters.
    let normalized = match trimmed.split_whitespace().count() {
        4 => format!("{} 0 1", trimmed),
        5 => format!("{} 1", trimmed),
        _ => trimmed.to_string(),
    };

    Board::from_fen(&normalized, false).map_err(|_| FenError::InvalidBoardLayout(fen.to_string()))
}

/// Format a Board as a FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

/// Placement, side to move, castling and en passant fields of a FEN.
///
/// Move counters do not change what an engine sees, so two positions that
/// differ only in counters share a key.
pub fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format: {0}")]
    InvalidFormat(String),
    #[error("Invalid board layout: {0}")]
    InvalidBoardLayout(String),
}
