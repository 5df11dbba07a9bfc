//! Material counting and the static attack checks behind sacrifice and
//! threat detection.

use cozy_chess::{BitBoard, Board, Color, Move, Piece, Square};
use smallvec::SmallVec;

/// Net material a move must put at risk to count as a sacrifice.
/// An exchange (rook for minor piece) qualifies, a lone pawn does not.
pub const SACRIFICE_MIN_CP: i32 = 150;

/// Standard piece values in centipawns.
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 20000,
    }
}

/// Material of `color`, king excluded.
pub fn material(board: &Board, color: Color) -> i32 {
    [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .into_iter()
        .map(|piece| (board.pieces(piece) & board.colors(color)).len() as i32 * piece_value(piece))
        .sum()
}

/// Material lead of `color` over its opponent.
pub fn material_balance(board: &Board, color: Color) -> i32 {
    material(board, color) - material(board, !color)
}

/// Knights, bishops, rooks and queens of both sides.
pub fn non_pawn_material(board: &Board) -> i32 {
    [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .into_iter()
        .map(|piece| board.pieces(piece).len() as i32 * piece_value(piece))
        .sum()
}

/// Returns all pieces of `color` that attack the given square.
pub fn attackers_of(board: &Board, sq: Square, color: Color) -> BitBoard {
    let occupied = board.occupied();
    let ours = board.colors(color);
    let diagonal = board.pieces(Piece::Bishop) | board.pieces(Piece::Queen);
    let orthogonal = board.pieces(Piece::Rook) | board.pieces(Piece::Queen);

    // A pawn of `color` attacks `sq` exactly when a pawn of the other color
    // standing on `sq` would attack it.
    (cozy_chess::get_pawn_attacks(sq, !color) & board.pieces(Piece::Pawn)
        | cozy_chess::get_knight_moves(sq) & board.pieces(Piece::Knight)
        | cozy_chess::get_bishop_moves(sq, occupied) & diagonal
        | cozy_chess::get_rook_moves(sq, occupied) & orthogonal
        | cozy_chess::get_king_moves(sq) & board.pieces(Piece::King))
        & ours
}

/// Values of the `color` pieces attacking `sq`, cheapest first.
pub fn attacker_values(board: &Board, sq: Square, color: Color) -> SmallVec<[i32; 8]> {
    let mut values: SmallVec<[i32; 8]> = attackers_of(board, sq, color)
        .into_iter()
        .filter_map(|from| board.piece_on(from))
        .map(piece_value)
        .collect();
    values.sort_unstable();
    values
}

/// Returns the attack bitboard for a specific piece on a square.
pub fn piece_attacks(board: &Board, sq: Square, piece: Piece, color: Color) -> BitBoard {
    let occupied = board.occupied();
    match piece {
        Piece::Pawn => cozy_chess::get_pawn_attacks(sq, color),
        Piece::Knight => cozy_chess::get_knight_moves(sq),
        Piece::Bishop => cozy_chess::get_bishop_moves(sq, occupied),
        Piece::Rook => cozy_chess::get_rook_moves(sq, occupied),
        Piece::Queen => {
            cozy_chess::get_bishop_moves(sq, occupied) | cozy_chess::get_rook_moves(sq, occupied)
        }
        Piece::King => cozy_chess::get_king_moves(sq),
    }
}

pub fn in_check(board: &Board) -> bool {
    !board.checkers().is_empty()
}

/// Whether the side to move has any legal capture, en passant included.
pub fn has_capture(board: &Board) -> bool {
    let enemy = board.colors(!board.side_to_move());
    let mut found = false;
    board.generate_moves(|moves| {
        found = if moves.piece == Piece::Pawn {
            moves.into_iter().any(|mv| mv.from.file() != mv.to.file())
        } else {
            !(moves.to & enemy).is_empty()
        };
        found
    });
    found
}

/// Net material the mover leaves en prise with `mv`, or 0 when the move is
/// not a sacrifice.
///
/// The moved piece must end up attacked. If it is defended the opponent is
/// assumed to take with its cheapest attacker and lose that piece back, so
/// even trades and favourable captures never count.
pub fn sacrificed_material(before: &Board, mv: Move) -> i32 {
    if !before.is_legal(mv) {
        return 0;
    }
    let Some(moving) = before.piece_on(mv.from) else {
        return 0;
    };
    if moving == Piece::King {
        return 0;
    }

    let mover = before.side_to_move();
    let captured = if before.colors(!mover).has(mv.to) {
        before.piece_on(mv.to).map(piece_value).unwrap_or(0)
    } else if moving == Piece::Pawn && mv.from.file() != mv.to.file() {
        piece_value(Piece::Pawn)
    } else {
        0
    };

    let mut after = before.clone();
    after.play_unchecked(mv);

    let value = piece_value(mv.promotion.unwrap_or(moving));
    let enemy_attackers = attacker_values(&after, mv.to, !mover);
    let Some(&cheapest) = enemy_attackers.first() else {
        return 0;
    };
    let defended = !attackers_of(&after, mv.to, mover).is_empty();

    let exposed = if defended { value - cheapest } else { value };
    let net = exposed - captured;
    if net >= SACRIFICE_MIN_CP {
        net
    } else {
        0
    }
}

/// Whether the piece that just moved to `mv.to` attacks something worth more
/// than itself, or an undefended piece other than a pawn.
pub fn creates_threat(after: &Board, mv: Move) -> bool {
    let mover = !after.side_to_move();
    if !after.colors(mover).has(mv.to) {
        return false;
    }
    let Some(piece) = after.piece_on(mv.to) else {
        return false;
    };
    let value = piece_value(piece);
    let targets = piece_attacks(after, mv.to, piece, mover)
        & after.colors(!mover)
        & !after.pieces(Piece::King);

    targets.into_iter().any(|sq| match after.piece_on(sq) {
        Some(target) => {
            piece_value(target) > value
                || (target != Piece::Pawn && attackers_of(after, sq, !mover).is_empty())
        }
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::{parse_fen, parse_uci_move};

    fn board(fen: &str) -> Board {
        parse_fen(fen).unwrap()
    }

    #[test]
    fn test_starting_material() {
        let b = Board::default();
        assert_eq!(material(&b, Color::White), 8 * 100 + 2 * 320 + 2 * 330 + 2 * 500 + 900);
        assert_eq!(material_balance(&b, Color::Black), 0);
        assert_eq!(non_pawn_material(&b), 2 * (2 * 320 + 2 * 330 + 2 * 500 + 900));
    }

    #[test]
    fn test_attackers_of() {
        // Knight on f3 covers e5, pawn on d2 covers e3
        let b = board("4k3/8/8/8/8/5N2/3P4/4K3 w - - 0 1");
        let e5 = Square::E5;
        assert!(attackers_of(&b, e5, Color::White).has(Square::F3));
        assert!(attackers_of(&b, Square::E3, Color::White).has(Square::D2));
        assert!(attackers_of(&b, e5, Color::Black).is_empty());
    }

    #[test]
    fn test_queen_sacrifice_detected() {
        let b = board("3r3k/6pp/7N/3Q4/8/8/PP6/K7 w - - 0 1");
        let mv = parse_uci_move(&b, "d5g8").unwrap();
        // Rook takes the queen, knight takes back: 900 - 500
        assert_eq!(sacrificed_material(&b, mv), 400);
    }

    #[test]
    fn test_even_trade_is_not_sacrifice() {
        // Nxe5 dxe5: knight for knight
        let b = board("4k3/8/3p4/4n3/8/5N2/8/4K3 w - - 0 1");
        let mv = parse_uci_move(&b, "f3e5").unwrap();
        assert_eq!(sacrificed_material(&b, mv), 0);
    }

    #[test]
    fn test_hanging_piece_is_sacrifice() {
        // Bishop steps onto an undefended square attacked by a pawn
        let b = board("4k3/8/3p4/8/8/2B5/8/4K3 w - - 0 1");
        let mv = parse_uci_move(&b, "c3e5").unwrap();
        assert_eq!(sacrificed_material(&b, mv), 330);
    }

    #[test]
    fn test_has_capture_and_check() {
        let b = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2");
        assert!(has_capture(&b));
        assert!(!in_check(&b));
        assert!(!has_capture(&Board::default()));
    }

    #[test]
    fn test_en_passant_counts_as_capture() {
        let b = board("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
        assert!(has_capture(&b));
    }

    #[test]
    fn test_fork_is_threat() {
        // Knight jumps to c7 attacking king and rook
        let before = board("r3k3/8/8/3N4/8/8/8/4K3 w - - 0 1");
        let mv = parse_uci_move(&before, "d5c7").unwrap();
        let mut after = before.clone();
        after.play_unchecked(mv);
        assert!(creates_threat(&after, mv));
    }

    #[test]
    fn test_quiet_move_is_not_threat() {
        let before = Board::default();
        let mv = parse_uci_move(&before, "g1f3").unwrap();
        let mut after = before.clone();
        after.play_unchecked(mv);
        assert!(!creates_threat(&after, mv));
    }
}
