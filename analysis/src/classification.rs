use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) of each tier, in centipawns of loss.
pub const BEST_MAX: i32 = 5;
pub const GREAT_MAX: i32 = 15;
pub const EXCELLENT_MAX: i32 = 25;
pub const GOOD_MAX: i32 = 50;
pub const ACCEPTABLE_MAX: i32 = 100;
pub const INACCURACY_MAX: i32 = 200;
pub const MISTAKE_MAX: i32 = 400;

/// NAG for a brilliant move (`!!`). Brilliance is a flag on top of the tier.
pub const BRILLIANT_NAG: u8 = 3;

/// Quality tier of a move, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClassification {
    Best,
    Great,
    Excellent,
    Good,
    Acceptable,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveClassification {
    pub const ALL: [MoveClassification; 8] = [
        Self::Best,
        Self::Great,
        Self::Excellent,
        Self::Good,
        Self::Acceptable,
        Self::Inaccuracy,
        Self::Mistake,
        Self::Blunder,
    ];

    /// Classify by centipawn loss. Each boundary belongs to the better tier;
    /// negative losses count as zero.
    pub fn from_cp_loss(cp_loss: i32) -> Self {
        let loss = cp_loss.max(0);
        if loss <= BEST_MAX {
            Self::Best
        } else if loss <= GREAT_MAX {
            Self::Great
        } else if loss <= EXCELLENT_MAX {
            Self::Excellent
        } else if loss <= GOOD_MAX {
            Self::Good
        } else if loss <= ACCEPTABLE_MAX {
            Self::Acceptable
        } else if loss <= INACCURACY_MAX {
            Self::Inaccuracy
        } else if loss <= MISTAKE_MAX {
            Self::Mistake
        } else {
            Self::Blunder
        }
    }

    /// 0 for Best up to 7 for Blunder.
    pub fn severity(self) -> u8 {
        self as u8
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Inaccuracy | Self::Mistake | Self::Blunder)
    }

    /// Best or Great: the move kept (nearly) everything the position offered.
    pub fn is_top_move(self) -> bool {
        matches!(self, Self::Best | Self::Great)
    }

    /// Numeric Annotation Glyph, where one applies.
    pub fn to_nag(self) -> Option<u8> {
        match self {
            Self::Great => Some(1),
            Self::Inaccuracy => Some(6),
            Self::Mistake => Some(2),
            Self::Blunder => Some(4),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Best => "Best",
            Self::Great => "Great",
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Acceptable => "Acceptable",
            Self::Inaccuracy => "Inaccuracy",
            Self::Mistake => "Mistake",
            Self::Blunder => "Blunder",
        }
    }
}

impl std::fmt::Display for MoveClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries_belong_to_lower_tier() {
        let cases = [
            (5, MoveClassification::Best),
            (6, MoveClassification::Great),
            (15, MoveClassification::Great),
            (16, MoveClassification::Excellent),
            (25, MoveClassification::Excellent),
            (26, MoveClassification::Good),
            (50, MoveClassification::Good),
            (51, MoveClassification::Acceptable),
            (100, MoveClassification::Acceptable),
            (101, MoveClassification::Inaccuracy),
            (200, MoveClassification::Inaccuracy),
            (201, MoveClassification::Mistake),
            (400, MoveClassification::Mistake),
            (401, MoveClassification::Blunder),
        ];
        for (loss, expected) in cases {
            assert_eq!(MoveClassification::from_cp_loss(loss), expected, "loss {loss}");
        }
    }

    #[test]
    fn test_negative_loss_is_best() {
        assert_eq!(MoveClassification::from_cp_loss(-80), MoveClassification::Best);
        assert_eq!(MoveClassification::from_cp_loss(0), MoveClassification::Best);
    }

    #[test]
    fn test_error_tiers() {
        let errors: Vec<_> = MoveClassification::ALL
            .into_iter()
            .filter(|c| c.is_error())
            .collect();
        assert_eq!(
            errors,
            vec![
                MoveClassification::Inaccuracy,
                MoveClassification::Mistake,
                MoveClassification::Blunder
            ]
        );
        assert_eq!(MoveClassification::Blunder.to_nag(), Some(4));
        assert_eq!(MoveClassification::Good.to_nag(), None);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&MoveClassification::Inaccuracy).unwrap();
        assert_eq!(json, "\"inaccuracy\"");
    }

    proptest! {
        #[test]
        fn test_classification_is_monotonic(a in -100i32..2000, b in -100i32..2000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                MoveClassification::from_cp_loss(lo).severity()
                    <= MoveClassification::from_cp_loss(hi).severity()
            );
        }
    }
}
