//! Engine-independent facts about each played move. The personality scorer
//! reads these; the analyzer only carries them along.

use std::collections::HashSet;

use chess::{position_key, PieceKind, PlayedMove};
use cozy_chess::Color;
use serde::{Deserialize, Serialize};

use crate::depth::Complexity;
use crate::material::{creates_threat, material_balance, non_pawn_material, sacrificed_material};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFeatures {
    pub piece: PieceKind,
    pub capture: bool,
    pub check: bool,
    /// The moved piece now attacks something bigger or something loose.
    pub threat: bool,
    pub castle: bool,
    pub promotion: bool,
    /// Check, capture or threat.
    pub forcing: bool,
    /// A non-forcing piece move: maneuvering. Pawn moves and castling are
    /// neither forcing nor quiet.
    pub quiet: bool,
    /// Net material put en prise, 0 when the move is not a sacrifice.
    pub sacrificed: i32,
    /// Complexity of the position the move was played in.
    pub complexity: Complexity,
    /// The resulting position already occurred earlier in the game.
    pub repeated_position: bool,
    /// The move undoes the same side's previous move.
    pub reverses_previous: bool,
    /// Material lead of the mover before the move.
    pub material_balance: i32,
    /// Non-pawn material of both sides before the move.
    pub non_pawn_material: i32,
}

impl MoveFeatures {
    pub fn is_sacrifice(&self) -> bool {
        self.sacrificed > 0
    }

    /// Moves that count toward tactical play: forcing moves, and any move
    /// made in a sharp position.
    pub fn is_tactical(&self) -> bool {
        self.forcing || self.complexity == Complexity::Sharp
    }
}

/// Features for every move of a replayed game, in ply order.
pub fn extract_features(moves: &[PlayedMove]) -> Vec<MoveFeatures> {
    let mut seen: HashSet<String> = HashSet::new();
    if let Some(first) = moves.first() {
        seen.insert(position_key(&first.fen_before));
    }

    moves
        .iter()
        .enumerate()
        .map(|(index, played)| {
            let mover: Color = played.color.into();
            let capture = played.is_capture();
            let threat = !played.is_castle && creates_threat(&played.board_after, played.mv);
            let forcing = played.is_check || capture || threat;
            let reverses_previous = index >= 2 && {
                let previous = &moves[index - 2].mv;
                previous.from == played.mv.to && previous.to == played.mv.from
            };

            MoveFeatures {
                piece: played.piece,
                capture,
                check: played.is_check,
                threat,
                castle: played.is_castle,
                promotion: played.promotion.is_some(),
                forcing,
                quiet: !forcing && !played.is_castle && played.piece != PieceKind::Pawn,
                sacrificed: sacrificed_material(&played.board_before, played.mv),
                complexity: Complexity::of(&played.board_before),
                repeated_position: !seen.insert(position_key(&played.fen_after)),
                reverses_previous,
                material_balance: material_balance(&played.board_before, mover),
                non_pawn_material: non_pawn_material(&played.board_before),
            }
        })
        .collect()
}
