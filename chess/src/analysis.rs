//! Engine score type shared by the engine adapter and the analyzers.

use serde::{Deserialize, Serialize};

/// Centipawn value used for a forced mate; shorter mates score higher.
pub const MATE_CP: i32 = 30000;

/// Engine evaluation score.
///
/// Centipawns: positive = the side whose perspective the score is in is better.
/// Mate: positive N = that side mates in N moves,
/// negative N = that side gets mated in N moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisScore {
    Centipawns(i32),
    Mate(i32),
}

impl AnalysisScore {
    pub fn display(&self) -> String {
        match self {
            Self::Centipawns(cp) => format!("{:+.2}", *cp as f64 / 100.0),
            Self::Mate(m) => {
                if *m > 0 {
                    format!("+M{}", m)
                } else {
                    format!("-M{}", m.abs())
                }
            }
        }
    }

    /// Convert to centipawns for comparison. Mate scores use large values.
    pub fn to_cp(&self) -> i32 {
        match self {
            Self::Centipawns(cp) => *cp,
            Self::Mate(m) => {
                if *m > 0 {
                    MATE_CP - *m * 100
                } else {
                    -MATE_CP - *m * 100
                }
            }
        }
    }

    /// Negate the score (flip perspective).
    pub fn negate(&self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(-cp),
            Self::Mate(m) => Self::Mate(-m),
        }
    }

    /// Moves until mate when this perspective delivers it.
    pub fn mating_in(&self) -> Option<i32> {
        match self {
            Self::Mate(m) if *m > 0 => Some(*m),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
