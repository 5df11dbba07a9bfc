//! UCI (Universal Chess Interface) utilities

use cozy_chess::{Board, File, Move, Piece, Rank, Square};

use crate::converters::{format_piece, format_square, parse_piece_letter, parse_square};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UciMoveError {
    #[error("malformed UCI move: {0}")]
    Malformed(String),
    #[error("illegal move in position: {0}")]
    Illegal(String),
}

/// Convert UCI castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let is_rank_1_or_8 = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);

    if is_rank_1_or_8 && is_e_file && is_g_or_c_file && mv.promotion.is_none() {
        let rook_file = if mv.to.file() == File::G { File::H } else { File::A };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };
        if legal_moves.contains(&converted) {
            return converted;
        }
    }

    mv
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
///
/// Does not know about castling; see [`format_uci_move_on`].
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

/// Format a move played on `board` in standard UCI, turning cozy-chess
/// king-takes-rook castling into the two-square king move engines expect.
pub fn format_uci_move_on(board: &Board, mv: Move) -> String {
    if is_castling(board, mv) {
        let to_file = if mv.to.file() > mv.from.file() { File::G } else { File::C };
        let to = Square::new(to_file, mv.from.rank());
        return format!("{}{}", format_square(mv.from), format_square(to));
    }
    format_uci_move(mv)
}

/// A cozy-chess castling move: the king "captures" its own rook.
pub fn is_castling(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.to) == Some(board.side_to_move())
        && board.piece_on(mv.to) == Some(Piece::Rook)
}

/// Parse a UCI move string and resolve it against the legal moves of `board`.
///
/// Both castling encodings (e1g1 and e1h1) are accepted.
pub fn parse_uci_move(board: &Board, s: &str) -> Result<Move, UciMoveError> {
    let mv = parse_raw(s).ok_or_else(|| UciMoveError::Malformed(s.to_string()))?;

    let mut legal = Vec::with_capacity(64);
    board.generate_moves(|moves| {
        legal.extend(moves);
        false
    });

    let resolved = convert_uci_castling_to_cozy(mv, &legal);
    if legal.contains(&resolved) {
        Ok(resolved)
    } else {
        Err(UciMoveError::Illegal(s.to_string()))
    }
}

fn parse_raw(s: &str) -> Option<Move> {
    let s = s.trim();
    if !s.is_ascii() || !(4..=5).contains(&s.len()) {
        return None;
    }
    let from = parse_square(&s[0..2])?;
    let to = parse_square(&s[2..4])?;
    let promotion = match s[4..].chars().next() {
        Some(c) => match parse_piece_letter(c)? {
            p @ (Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen) => Some(p),
            _ => return None,
        },
        None => None,
    };
    Some(Move { from, to, promotion })
}
