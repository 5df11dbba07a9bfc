pub mod analysis;
pub mod converters;
pub mod fen;
pub mod game;
pub mod pgn;
pub mod types;
pub mod uci;

pub use analysis::{AnalysisScore, MATE_CP};
pub use converters::*;
pub use fen::{format_fen, parse_fen, position_key, FenError, STARTING_FEN};
pub use game::{replay, Game, GameError, PlayedMove, Replay, Truncation};
pub use pgn::{format_san, parse_pgn, parse_san, GameResult, PgnError, PgnGame, SanError};
pub use types::{PieceColor, PieceKind};
pub use uci::{
    convert_uci_castling_to_cozy, format_uci_move, format_uci_move_on, is_castling, parse_uci_move,
    UciMoveError,
};
