use cozy_chess::{Board, Color};
use serde::{Deserialize, Serialize};

use crate::material::{has_capture, in_check, material_balance};

/// At or below this many pieces (kings included) a position is simple.
pub const SIMPLE_MAX_PIECES: u32 = 10;
/// Material lead beyond which a position is treated as decided.
pub const DECIDED_MATERIAL_CP: i32 = 500;
/// Sharp positions need more than this many pieces on the board.
pub const SHARP_MIN_PIECES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Normal,
    Sharp,
}

impl Complexity {
    /// Simple: few pieces left or one side clearly ahead on material.
    /// Sharp: a check or capture is on the board with more than 20 pieces.
    pub fn of(board: &Board) -> Self {
        let pieces = board.occupied().len();
        if pieces <= SIMPLE_MAX_PIECES
            || material_balance(board, Color::White).abs() > DECIDED_MATERIAL_CP
        {
            Self::Simple
        } else if pieces > SHARP_MIN_PIECES && (in_check(board) || has_capture(board)) {
            Self::Sharp
        } else {
            Self::Normal
        }
    }
}

/// Picks the search depth for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPolicy {
    pub reduced: u8,
    pub standard: u8,
    pub deep: u8,
    /// When false every position gets `standard`.
    pub adaptive: bool,
}

impl Default for DepthPolicy {
    fn default() -> Self {
        Self {
            reduced: 10,
            standard: 14,
            deep: 16,
            adaptive: true,
        }
    }
}

impl DepthPolicy {
    pub fn fixed(depth: u8) -> Self {
        Self {
            reduced: depth,
            standard: depth,
            deep: depth,
            adaptive: false,
        }
    }

    pub fn depth_for(&self, board: &Board) -> u8 {
        if !self.adaptive {
            return self.standard;
        }
        match Complexity::of(board) {
            Complexity::Simple => self.reduced,
            Complexity::Normal => self.standard,
            Complexity::Sharp => self.deep,
        }
    }
}
