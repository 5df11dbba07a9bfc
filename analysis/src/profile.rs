//! The per-player view: repertoire, style and ratings, recomputed from game
//! summaries whenever it is asked for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregator::{round2, scoped_accuracy};
use crate::openings::{analyze_repertoire, OpeningStats};
use crate::personality::{score_personality, PersonalityScores};
use crate::player::PlayerGame;

/// Games kept in the rolling rating average.
pub const ROLLING_WINDOW: usize = 10;

/// Controls at or above this base are correspondence games.
const DAILY_BASE_SECS: u32 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeControlBucket {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Daily,
    Unknown,
}

impl TimeControlBucket {
    /// Bucket for a PGN-style time control: `"180+2"`, `"600"`,
    /// `"1/86400"` or `"-"`. The expected game length is estimated as
    /// base plus forty increments.
    pub fn from_time_control(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "-" || raw == "?" {
            return Self::Unknown;
        }
        if raw.contains('/') {
            return Self::Daily;
        }

        let (base, increment) = match raw.split_once('+') {
            Some((base, increment)) => (base.trim().parse::<u32>(), increment.trim().parse::<u32>()),
            None => (raw.parse::<u32>(), Ok(0)),
        };
        let (Ok(base), Ok(increment)) = (base, increment) else {
            return Self::Unknown;
        };

        if base >= DAILY_BASE_SECS {
            return Self::Daily;
        }
        let estimate = base.saturating_add(increment.saturating_mul(40));
        if estimate < 180 {
            Self::Bullet
        } else if estimate < 480 {
            Self::Blitz
        } else if estimate < 1500 {
            Self::Rapid
        } else {
            Self::Classical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub bucket: TimeControlBucket,
    pub games: u32,
    /// Rating of the most recently played rated game.
    pub current: Option<u32>,
    pub rolling_average: Option<f64>,
}

/// Current and rolling rating per time-control bucket. Games are ordered
/// by timestamp; games without one keep their input order ahead of dated
/// games.
pub fn rating_summaries(games: &[PlayerGame<'_>]) -> Vec<RatingSummary> {
    let mut buckets: BTreeMap<TimeControlBucket, Vec<&PlayerGame<'_>>> = BTreeMap::new();
    for game in games {
        let bucket = game
            .time_control
            .map_or(TimeControlBucket::Unknown, TimeControlBucket::from_time_control);
        buckets.entry(bucket).or_default().push(game);
    }

    buckets
        .into_iter()
        .map(|(bucket, mut games)| {
            games.sort_by_key(|game| game.played_at);
            let rated: Vec<u32> = games.iter().filter_map(|game| game.rating).collect();
            let window = &rated[rated.len().saturating_sub(ROLLING_WINDOW)..];
            let rolling_average = (!window.is_empty()).then(|| {
                round2(window.iter().map(|&r| r as f64).sum::<f64>() / window.len() as f64)
            });
            RatingSummary {
                bucket,
                games: games.len() as u32,
                current: rated.last().copied(),
                rolling_average,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player: String,
    /// Games with a known player color.
    pub games: u32,
    /// Games left out because the player's color was unknown.
    pub games_excluded: u32,
    /// Accuracy over all of the player's analyzed moves.
    pub accuracy: Option<f64>,
    pub personality: PersonalityScores,
    pub openings: Vec<OpeningStats>,
    pub ratings: Vec<RatingSummary>,
}

/// Materialize a player's profile from their analyzed games.
pub fn build_profile(player: impl Into<String>, games: &[PlayerGame<'_>]) -> PlayerProfile {
    let player = player.into();
    let (known, unknown): (Vec<PlayerGame<'_>>, Vec<PlayerGame<'_>>) =
        games.iter().copied().partition(|game| game.color.is_some());
    if !unknown.is_empty() {
        tracing::warn!(
            player = %player,
            excluded = unknown.len(),
            "games without a player color left out of the profile"
        );
    }

    PlayerProfile {
        games: known.len() as u32,
        games_excluded: unknown.len() as u32,
        accuracy: scoped_accuracy(known.iter().flat_map(|game| game.own_moves())),
        personality: score_personality(&known),
        openings: analyze_repertoire(&known),
        ratings: rating_summaries(&known),
        player,
    }
}
