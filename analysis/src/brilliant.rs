//! Brilliant-move detection.
//!
//! A move is brilliant only when all of these hold: it gives up material, it
//! costs no more than a Good move would, and the engine's view of the
//! resulting position shows why. That justification is either a mate for
//! the mover within [`MATE_HORIZON`] moves, or an engine line in which the
//! material comes back within [`RECOVERY_HORIZON_PLIES`] plies while the
//! mover stays clearly better. Anything short of that is not brilliant.

use chess::{replay, AnalysisScore, PlayedMove};
use cozy_chess::{Color, GameStatus};

use crate::classification::GOOD_MAX;
use crate::material::{material_balance, SACRIFICE_MIN_CP};

pub const MATE_HORIZON: i32 = 5;
pub const RECOVERY_HORIZON_PLIES: usize = 8;
pub const RECOVERY_MIN_ADVANTAGE_CP: i32 = 200;

/// What brilliant detection looks at for one ply.
#[derive(Debug, Clone, Copy)]
pub struct BrilliantCandidate<'a> {
    pub played: &'a PlayedMove,
    /// Net material put en prise, see [`crate::material::sacrificed_material`].
    pub sacrificed: i32,
    pub cp_loss: i32,
    /// Score of the position after the move, from the mover's side.
    pub score_after: AnalysisScore,
    /// Engine line from the position after the move, in UCI.
    pub pv_after: &'a [String],
}

pub fn is_brilliant(candidate: &BrilliantCandidate<'_>) -> bool {
    if candidate.sacrificed < SACRIFICE_MIN_CP || candidate.cp_loss > GOOD_MAX {
        return false;
    }
    if candidate
        .score_after
        .mating_in()
        .is_some_and(|moves| moves <= MATE_HORIZON)
    {
        return true;
    }
    recovers_material(candidate)
}

fn recovers_material(candidate: &BrilliantCandidate<'_>) -> bool {
    if candidate.score_after.to_cp() < RECOVERY_MIN_ADVANTAGE_CP {
        return false;
    }

    let played = candidate.played;
    let mover: Color = played.color.into();
    let baseline = material_balance(&played.board_before, mover);
    let horizon = candidate.pv_after.len().min(RECOVERY_HORIZON_PLIES);
    let Ok(line) = replay(Some(played.fen_after.as_str()), &candidate.pv_after[..horizon]) else {
        return false;
    };

    // The material has to actually leave the board before it can come back.
    let mut given_up = false;
    for ply in &line.moves {
        if ply.color == played.color && ply.board_after.status() == GameStatus::Won {
            return true;
        }
        if material_balance(&ply.board_after, mover) < baseline {
            given_up = true;
        } else if given_up {
            return true;
        }
    }
    false
}
