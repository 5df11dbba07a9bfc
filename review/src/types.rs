use std::fmt;

use analysis::{GameSummary, PlayerGame};
use chess::{parse_pgn, replay, GameResult, PieceColor, Replay};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReviewError;

/// Opaque handle of a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the game source knows about a game besides its moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMeta {
    /// The player this game was imported for.
    pub player: Option<String>,
    pub player_color: Option<PieceColor>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub platform: Option<String>,
    pub time_control: Option<String>,
    pub white_rating: Option<u32>,
    pub black_rating: Option<u32>,
    pub result: Option<GameResult>,
    pub opening: Option<String>,
    /// Unix seconds.
    pub played_at: Option<i64>,
}

impl GameMeta {
    /// Side `player` had in this game, if it can be told. An explicit
    /// `player_color` counts unless the record names a different player.
    pub fn color_of(&self, player: &str) -> Option<PieceColor> {
        let same_player = self
            .player
            .as_deref()
            .map_or(true, |name| name.eq_ignore_ascii_case(player));
        if same_player {
            if let Some(color) = self.player_color {
                return Some(color);
            }
        }
        let named = |name: &Option<String>| {
            name.as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(player))
        };
        match (named(&self.white), named(&self.black)) {
            (true, false) => Some(PieceColor::White),
            (false, true) => Some(PieceColor::Black),
            _ => None,
        }
    }

    pub fn rating_of(&self, color: PieceColor) -> Option<u32> {
        match color {
            PieceColor::White => self.white_rating,
            PieceColor::Black => self.black_rating,
        }
    }

    /// Fill fields still unset from PGN tag pairs.
    fn merge_pgn_tags(&mut self, tag: impl Fn(&str) -> Option<String>) {
        let rating = |name: &str| tag(name).and_then(|value| value.trim().parse().ok());
        self.white = self.white.take().or_else(|| tag("White"));
        self.black = self.black.take().or_else(|| tag("Black"));
        self.white_rating = self.white_rating.or_else(|| rating("WhiteElo"));
        self.black_rating = self.black_rating.or_else(|| rating("BlackElo"));
        self.time_control = self.time_control.take().or_else(|| tag("TimeControl"));
        self.opening = self.opening.take().or_else(|| tag("Opening"));
        self.platform = self.platform.take().or_else(|| tag("Site"));
        self.result = self
            .result
            .or_else(|| tag("Result").and_then(|value| GameResult::parse(&value)));
    }
}

/// One game to analyze: either a move list or PGN text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInput {
    pub id: String,
    #[serde(default)]
    pub meta: GameMeta,
    #[serde(default)]
    pub start_fen: Option<String>,
    /// SAN or UCI tokens; ignored when `pgn` is set.
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub pgn: Option<String>,
}

impl GameInput {
    pub fn from_moves(id: impl Into<String>, moves: &[&str]) -> Self {
        Self {
            id: id.into(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn from_pgn(id: impl Into<String>, pgn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pgn: Some(pgn.into()),
            ..Self::default()
        }
    }

    /// Replay the game. An unplayable move ends the replay early and is
    /// reported as a truncation; only an unusable start position or PGN
    /// is an error.
    pub fn replay(&self) -> Result<(Replay, GameMeta), ReviewError> {
        let mut meta = self.meta.clone();

        let Some(text) = &self.pgn else {
            let replayed = replay(self.start_fen.as_deref(), &self.moves).map_err(|source| {
                ReviewError::Replay {
                    game_id: self.id.clone(),
                    source,
                }
            })?;
            return Ok((replayed, meta));
        };

        let pgn = parse_pgn(text).map_err(|source| ReviewError::Pgn {
            game_id: self.id.clone(),
            source,
        })?;
        meta.merge_pgn_tags(|name| pgn.tag(name).map(str::to_string));
        let start = pgn.start_fen().or(self.start_fen.as_deref());
        let replayed = replay(start, &pgn.moves).map_err(|source| ReviewError::Replay {
            game_id: self.id.clone(),
            source,
        })?;
        Ok((replayed, meta))
    }
}

/// Lifecycle of a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued { total_games: u32 },
    Running { completed_games: u32, total_games: u32 },
    Completed { completed_games: u32, failed_games: u32 },
    Cancelled { completed_games: u32, total_games: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled { .. })
    }
}

/// A game the batch could not produce a summary for, or whose summary could
/// not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFailure {
    pub game_id: String,
    pub error: String,
}

/// Outcome of one batch, with summaries in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub job_id: JobId,
    pub summaries: Vec<GameSummary>,
    pub failures: Vec<GameFailure>,
    /// Games that were summarized (and are in `summaries`) but not stored.
    #[serde(default)]
    pub store_failures: Vec<GameFailure>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn summary(&self, game_id: &str) -> Option<&GameSummary> {
        self.summaries.iter().find(|summary| summary.game_id == game_id)
    }
}

/// A stored summary together with the metadata of its game, seen from one
/// player's side.
pub fn player_game<'a>(
    summary: &'a GameSummary,
    meta: &'a GameMeta,
    player: &str,
) -> PlayerGame<'a> {
    let color = meta.color_of(player);
    PlayerGame {
        opening: meta.opening.as_deref(),
        result: meta.result,
        time_control: meta.time_control.as_deref(),
        rating: color.and_then(|color| meta.rating_of(color)),
        played_at: meta.played_at,
        ..PlayerGame::new(summary, color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PGN: &str = r#"[Event "Casual"]
[Site "lichess.org"]
[White "alice"]
[Black "bob"]
[Result "0-1"]
[WhiteElo "1500"]
[BlackElo "1620"]
[TimeControl "180+2"]
[Opening "Caro-Kann Defense: Advance Variation"]

1. e4 c6 2. d4 d5 3. e5 Bf5 0-1
"#;

    #[test]
    fn test_pgn_input_fills_meta_from_tags() {
        let input = GameInput::from_pgn("g1", PGN);
        let (replayed, meta) = input.replay().unwrap();

        assert_eq!(replayed.moves.len(), 6);
        assert!(!replayed.is_truncated());
        assert_eq!(meta.white.as_deref(), Some("alice"));
        assert_eq!(meta.black_rating, Some(1620));
        assert_eq!(meta.result, Some(GameResult::BlackWins));
        assert_eq!(meta.time_control.as_deref(), Some("180+2"));
        assert_eq!(meta.color_of("Bob"), Some(PieceColor::Black));
        assert_eq!(meta.color_of("carol"), None);
    }

    #[test]
    fn test_explicit_meta_wins_over_tags() {
        let mut input = GameInput::from_pgn("g1", PGN);
        input.meta.opening = Some("Caro-Kann Defense".into());
        input.meta.player = Some("alice".into());
        input.meta.player_color = Some(PieceColor::White);

        let (_, meta) = input.replay().unwrap();
        assert_eq!(meta.opening.as_deref(), Some("Caro-Kann Defense"));
        assert_eq!(meta.color_of("alice"), Some(PieceColor::White));
    }

    #[test]
    fn test_player_color_without_player_name() {
        let meta = GameMeta {
            player_color: Some(PieceColor::Black),
            ..GameMeta::default()
        };
        assert_eq!(meta.color_of("alice"), Some(PieceColor::Black));

        let other = GameMeta {
            player: Some("bob".into()),
            ..meta.clone()
        };
        assert_eq!(other.color_of("alice"), None);
        assert_eq!(other.color_of("Bob"), Some(PieceColor::Black));
    }

    #[test]
    fn test_illegal_move_truncates() {
        let input = GameInput::from_moves("g2", &["e4", "e5", "Ke3", "Nc6"]);
        let (replayed, _) = input.replay().unwrap();
        assert_eq!(replayed.moves.len(), 2);
        let truncation = replayed.truncated.unwrap();
        assert_eq!(truncation.ply, 3);
        assert_eq!(truncation.token, "Ke3");
    }

    #[test]
    fn test_bad_start_position_is_an_error() {
        let input = GameInput {
            start_fen: Some("not a fen".into()),
            ..GameInput::from_moves("g3", &["e4"])
        };
        assert!(matches!(input.replay(), Err(ReviewError::Replay { .. })));
    }

    #[test]
    fn test_game_input_json_shape() {
        let json = r#"{"id":"g4","moves":["e2e4","e7e5"],"meta":{"player":"alice","player_color":"white","result":"1-0"}}"#;
        let input: GameInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.meta.player_color, Some(PieceColor::White));
        assert_eq!(input.meta.result, Some(GameResult::WhiteWins));
        assert_eq!(input.replay().unwrap().0.moves[1].san, "e5");
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued { total_games: 1 }.is_terminal());
        assert!(JobStatus::Cancelled {
            completed_games: 0,
            total_games: 1
        }
        .is_terminal());
        let json = serde_json::to_value(JobStatus::Running {
            completed_games: 1,
            total_games: 3,
        })
        .unwrap();
        assert_eq!(json["state"], "running");
    }
}
