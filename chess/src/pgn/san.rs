use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::converters::{
    char_to_file, char_to_rank, file_to_char, format_square, parse_piece_letter, parse_square,
    rank_to_char, san_piece_letter,
};
use crate::uci::is_castling;

/// Parse Standard Algebraic Notation (SAN) move
///
/// Tolerant of `0-0` castling, missing or extra check markers, trailing
/// annotation glyphs (`!`, `?`) and promotions written without `=`.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let cleaned = san
        .trim()
        .trim_end_matches(" e.p.")
        .trim_end_matches(['+', '#', '!', '?']);
    if cleaned.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    let legal = legal_moves(board);

    let castle_kingside = match cleaned {
        "O-O" | "0-0" => Some(true),
        "O-O-O" | "0-0-0" => Some(false),
        _ => None,
    };
    if let Some(kingside) = castle_kingside {
        return legal
            .into_iter()
            .find(|&mv| {
                is_castling(board, mv) && (mv.to.file() > mv.from.file()) == kingside
            })
            .ok_or_else(|| SanError::NoLegalMove(san.to_string()));
    }

    let (body, promotion) = split_promotion(cleaned, san)?;

    let mut chars: Vec<char> = body.chars().filter(|c| *c != 'x' && *c != '-').collect();
    let piece = match chars.first() {
        Some(c) if c.is_ascii_uppercase() => {
            let piece = parse_piece_letter(*c).ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
            chars.remove(0);
            piece
        }
        Some(_) => Piece::Pawn,
        None => return Err(SanError::InvalidFormat(san.to_string())),
    };

    if chars.len() < 2 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let dest: String = chars[chars.len() - 2..].iter().collect();
    let to = parse_square(&dest).ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;

    let mut from_file = None;
    let mut from_rank = None;
    for c in &chars[..chars.len() - 2] {
        if let Some(file) = char_to_file(*c) {
            from_file = Some(file);
        } else if let Some(rank) = char_to_rank(*c) {
            from_rank = Some(rank);
        } else {
            return Err(SanError::InvalidFormat(san.to_string()));
        }
    }

    let candidates: Vec<Move> = legal
        .into_iter()
        .filter(|&mv| {
            mv.to == to
                && mv.promotion == promotion
                && board.piece_on(mv.from) == Some(piece)
                && !is_castling(board, mv)
                && from_file.map_or(true, |f| mv.from.file() == f)
                && from_rank.map_or(true, |r| mv.from.rank() == r)
        })
        .collect();

    match candidates.as_slice() {
        [mv] => Ok(*mv),
        [] => Err(SanError::NoLegalMove(san.to_string())),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

fn split_promotion<'a>(body: &'a str, original: &str) -> Result<(&'a str, Option<Piece>), SanError> {
    if let Some((head, promo)) = body.split_once('=') {
        let piece = promo
            .chars()
            .next()
            .and_then(parse_piece_letter)
            .filter(|p| matches!(p, Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen))
            .ok_or_else(|| SanError::InvalidPromotion(original.to_string()))?;
        return Ok((head, Some(piece)));
    }

    // "e8Q" style
    let mut rev = body.chars().rev();
    if let (Some(last), Some(prev)) = (rev.next(), rev.next()) {
        if last.is_ascii_uppercase() && prev.is_ascii_digit() {
            let piece = parse_piece_letter(last)
                .filter(|p| matches!(p, Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen))
                .ok_or_else(|| SanError::InvalidPromotion(original.to_string()))?;
            return Ok((&body[..body.len() - 1], Some(piece)));
        }
    }

    Ok((body, None))
}

/// Format a legal move as SAN, including disambiguation and check suffixes.
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = String::with_capacity(8);

    if is_castling(board, mv) {
        san.push_str(if mv.to.file() > mv.from.file() { "O-O" } else { "O-O-O" });
    } else {
        let piece = board.piece_on(mv.from).unwrap_or(Piece::Pawn);
        let is_capture = board.colors(!board.side_to_move()).has(mv.to)
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push(file_to_char(mv.from.file()));
            }
        } else {
            san.push(san_piece_letter(piece));
            san.push_str(&disambiguation(board, mv, piece));
        }

        if is_capture {
            san.push('x');
        }
        san.push_str(&format_square(mv.to));

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(san_piece_letter(promo));
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if after.status() == GameStatus::Won {
        san.push('#');
    } else if !after.checkers().is_empty() {
        san.push('+');
    }

    san
}

fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let rivals: Vec<Move> = legal_moves(board)
        .into_iter()
        .filter(|other| {
            other.to == mv.to && other.from != mv.from && board.piece_on(other.from) == Some(piece)
        })
        .collect();

    if rivals.is_empty() {
        return String::new();
    }
    if rivals.iter().all(|o| o.from.file() != mv.from.file()) {
        return file_to_char(mv.from.file()).to_string();
    }
    if rivals.iter().all(|o| o.from.rank() != mv.from.rank()) {
        return rank_to_char(mv.from.rank()).to_string();
    }
    format_square(mv.from)
}

fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::with_capacity(64);
    board.generate_moves(|piece_moves| {
        moves.extend(piece_moves);
        false
    });
    moves
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}
