use cozy_chess::{Board, GameStatus, Move};
use serde::{Deserialize, Serialize};

use crate::fen::{format_fen, parse_fen, STARTING_FEN};
use crate::pgn::san::{format_san, parse_san, SanError};
use crate::types::{PieceColor, PieceKind};
use crate::uci::{format_uci_move_on, is_castling, parse_uci_move, UciMoveError};

/// Game state wrapper around a cozy-chess Board that records every ply.
#[derive(Debug, Clone)]
pub struct Game {
    start_fen: String,
    position: Board,
    history: Vec<PlayedMove>,
}

/// One replayed ply with both notations and the boards around it.
#[derive(Debug, Clone)]
pub struct PlayedMove {
    /// 1-based, interleaving White and Black.
    pub ply: u32,
    /// Full-move number of the position the move was played from, as
    /// printed in PGN. Counts on from the start FEN, not from 1.
    pub move_number: u32,
    pub color: PieceColor,
    pub mv: Move,
    pub uci: String,
    pub san: String,
    pub piece: PieceKind,
    pub captured: Option<PieceKind>,
    pub promotion: Option<PieceKind>,
    pub is_check: bool,
    pub is_castle: bool,
    pub fen_before: String,
    pub fen_after: String,
    pub board_before: Board,
    pub board_after: Board,
}

impl PlayedMove {
    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }
}

impl Game {
    /// Create a new game from the standard starting position
    pub fn new() -> Self {
        Self {
            start_fen: STARTING_FEN.to_string(),
            position: Board::default(),
            history: Vec::new(),
        }
    }

    /// Create a game from a FEN string
    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let position = parse_fen(fen)?;
        Ok(Self {
            start_fen: format_fen(&position),
            position,
            history: Vec::new(),
        })
    }

    pub fn start_fen(&self) -> &str {
        &self.start_fen
    }

    /// Get the current board position
    pub fn position(&self) -> &Board {
        &self.position
    }

    /// Get the move history
    pub fn history(&self) -> &[PlayedMove] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PlayedMove> {
        self.history
    }

    /// Get the current game status
    pub fn status(&self) -> GameStatus {
        self.position.status()
    }

    /// Export position to FEN string
    pub fn to_fen(&self) -> String {
        format_fen(&self.position)
    }

    /// Play a move given in SAN or UCI; the notation is detected from the token.
    pub fn play_token(&mut self, token: &str) -> Result<&PlayedMove, GameError> {
        if self.status() != GameStatus::Ongoing {
            return Err(GameError::GameOver);
        }
        let mv = if looks_like_uci(token) {
            parse_uci_move(&self.position, token)?
        } else {
            parse_san(&self.position, token)?
        };
        self.make_move(mv)
    }

    /// Make a legal move on the board
    pub fn make_move(&mut self, mv: Move) -> Result<&PlayedMove, GameError> {
        let before = &self.position;
        if !before.is_legal(mv) {
            return Err(GameError::IllegalMove(crate::uci::format_uci_move(mv)));
        }

        let color = PieceColor::from(before.side_to_move());
        let piece = before
            .piece_on(mv.from)
            .ok_or_else(|| GameError::IllegalMove(crate::uci::format_uci_move(mv)))?;
        let is_castle = is_castling(before, mv);
        let captured = if is_castle {
            None
        } else if let Some(target) = before.piece_on(mv.to) {
            Some(target)
        } else if piece == cozy_chess::Piece::Pawn && mv.from.file() != mv.to.file() {
            Some(cozy_chess::Piece::Pawn)
        } else {
            None
        };

        let san = format_san(before, mv);
        let uci = format_uci_move_on(before, mv);

        let mut after = before.clone();
        after.play_unchecked(mv);

        let played = PlayedMove {
            ply: self.history.len() as u32 + 1,
            move_number: u32::from(before.fullmove_number()),
            color,
            mv,
            uci,
            san,
            piece: piece.into(),
            captured: captured.map(PieceKind::from),
            promotion: mv.promotion.map(PieceKind::from),
            is_check: !after.checkers().is_empty(),
            is_castle,
            fen_before: format_fen(before),
            fen_after: format_fen(&after),
            board_before: before.clone(),
            board_after: after.clone(),
        };

        self.position = after;
        self.history.push(played);
        Ok(&self.history[self.history.len() - 1])
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_uci(token: &str) -> bool {
    let b = token.trim().as_bytes();
    (b.len() == 4 || b.len() == 5)
        && (b'a'..=b'h').contains(&b[0])
        && (b'1'..=b'8').contains(&b[1])
        && (b'a'..=b'h').contains(&b[2])
        && (b'1'..=b'8').contains(&b[3])
        && (b.len() == 4 || matches!(b[4], b'n' | b'b' | b'r' | b'q'))
}

/// Where and why a replay stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// Ply the offending token would have occupied.
    pub ply: u32,
    pub token: String,
    pub reason: String,
}

/// Result of replaying a move list: the valid prefix and, if the list could
/// not be fully replayed, where it broke.
#[derive(Debug, Clone)]
pub struct Replay {
    pub start_fen: String,
    pub moves: Vec<PlayedMove>,
    pub truncated: Option<Truncation>,
}

impl Replay {
    pub fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }
}

/// Replay `tokens` (SAN or UCI, mixed freely) from `start_fen` or the
/// standard position.
///
/// Only an unparseable start position is an error. A token that cannot be
/// played ends the replay and is reported as a [`Truncation`].
pub fn replay<S: AsRef<str>>(start_fen: Option<&str>, tokens: &[S]) -> Result<Replay, GameError> {
    let mut game = match start_fen {
        Some(fen) => Game::from_fen(fen)?,
        None => Game::new(),
    };

    let mut truncated = None;
    for token in tokens {
        let token = token.as_ref().trim();
        if token.is_empty() {
            continue;
        }
        if let Err(err) = game.play_token(token) {
            truncated = Some(Truncation {
                ply: game.history().len() as u32 + 1,
                token: token.to_string(),
                reason: err.to_string(),
            });
            break;
        }
    }

    Ok(Replay {
        start_fen: game.start_fen().to_string(),
        moves: game.into_history(),
        truncated,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Game is already over")]
    GameOver,
    #[error("FEN parse error: {0}")]
    Fen(#[from] crate::fen::FenError),
    #[error("SAN error: {0}")]
    San(#[from] SanError),
    #[error("UCI move error: {0}")]
    Uci(#[from] UciMoveError),
}
