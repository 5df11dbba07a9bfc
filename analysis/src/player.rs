use chess::{GameResult, PieceColor};
use serde::{Deserialize, Serialize};

use crate::aggregator::GameSummary;
use crate::move_analyzer::MoveAnalysis;

/// One analyzed game seen from a single player's side.
#[derive(Debug, Clone, Copy)]
pub struct PlayerGame<'a> {
    pub summary: &'a GameSummary,
    /// Side the player had. Games without it are left out of every
    /// per-player statistic.
    pub color: Option<PieceColor>,
    /// Opening name as the game source reported it.
    pub opening: Option<&'a str>,
    pub result: Option<GameResult>,
    pub time_control: Option<&'a str>,
    /// The player's rating going into the game.
    pub rating: Option<u32>,
    /// Unix seconds.
    pub played_at: Option<i64>,
}

impl<'a> PlayerGame<'a> {
    pub fn new(summary: &'a GameSummary, color: Option<PieceColor>) -> Self {
        Self {
            summary,
            color,
            opening: None,
            result: None,
            time_control: None,
            rating: None,
            played_at: None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::for_player(self.result?, self.color?)
    }

    /// The player's own moves; empty when the color is unknown.
    pub fn own_moves(&self) -> impl Iterator<Item = &'a MoveAnalysis> + Clone {
        let color = self.color;
        self.summary
            .moves
            .iter()
            .filter(move |m| Some(m.color) == color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn for_player(result: GameResult, color: PieceColor) -> Option<Self> {
        match (result, color) {
            (GameResult::WhiteWins, PieceColor::White) | (GameResult::BlackWins, PieceColor::Black) => {
                Some(Self::Win)
            }
            (GameResult::WhiteWins, PieceColor::Black) | (GameResult::BlackWins, PieceColor::White) => {
                Some(Self::Loss)
            }
            (GameResult::Draw, _) => Some(Self::Draw),
            (GameResult::Ongoing, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_follows_color() {
        assert_eq!(
            Outcome::for_player(GameResult::BlackWins, PieceColor::Black),
            Some(Outcome::Win)
        );
        assert_eq!(
            Outcome::for_player(GameResult::BlackWins, PieceColor::White),
            Some(Outcome::Loss)
        );
        assert_eq!(Outcome::for_player(GameResult::Ongoing, PieceColor::White), None);
    }
}
