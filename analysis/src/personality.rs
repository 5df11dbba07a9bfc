//! Six playing-style traits on a 0-100 scale.
//!
//! Aggressive and Patient read the same two ratios (forcing and quiet
//! moves) with opposite signs; Novelty and Staleness do the same with
//! variety and repetition. Neither pair is computed from the other, so a
//! player can drift away from a perfect inverse. Tactical and Positional
//! measure accuracy on disjoint sets of moves and are independent.
//! Skill never enters Novelty or Staleness.

use std::collections::HashSet;

use chess::PieceKind;
use serde::{Deserialize, Serialize};

use crate::aggregator::{accuracy_from_cp_loss, round2};
use crate::move_analyzer::{MoveAnalysis, MAX_CP_LOSS};
use crate::openings::player_opening;
use crate::player::PlayerGame;

/// Score reported when there is nothing to measure.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Loss at or under which a quiet move extends an accuracy streak.
const STREAK_MAX_LOSS: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityScores {
    pub tactical: f64,
    pub positional: f64,
    pub aggressive: f64,
    pub patient: f64,
    pub novelty: f64,
    pub staleness: f64,
    /// Own moves the scores were computed from.
    pub sample_moves: u32,
    pub sample_games: u32,
}

impl Default for PersonalityScores {
    fn default() -> Self {
        Self {
            tactical: NEUTRAL_SCORE,
            positional: NEUTRAL_SCORE,
            aggressive: NEUTRAL_SCORE,
            patient: NEUTRAL_SCORE,
            novelty: NEUTRAL_SCORE,
            staleness: NEUTRAL_SCORE,
            sample_moves: 0,
            sample_games: 0,
        }
    }
}

/// Counts gathered in one pass over the player's own moves.
#[derive(Debug, Default)]
struct Signals {
    games: u32,
    moves: u32,
    forcing: u32,
    quiet: u32,
    sacrifices: u32,
    brilliants: u32,
    /// Forcing moves that follow the player's previous forcing move.
    sustained: u32,
    repeats: u32,
    analyzed: u32,
    errors: u32,
    pieces: [u32; 6],
    openings: HashSet<String>,

    tactical_losses: Vec<i32>,
    tactical_top: u32,
    forcing_analyzed: u32,
    forcing_errors: u32,

    quiet_losses: Vec<i32>,
    quiet_drift: Vec<i32>,
    longest_streaks: Vec<u32>,
}

impl Signals {
    fn collect(games: &[PlayerGame<'_>]) -> Self {
        let mut signals = Self::default();

        for game in games {
            if game.color.is_none() {
                tracing::debug!(game_id = %game.summary.game_id, "skipping game without player color");
                continue;
            }
            signals.games += 1;
            if let Some(opening) = player_opening(game) {
                signals.openings.insert(opening);
            }
            signals.record_game(game.own_moves());
        }

        signals
    }

    fn record_game<'a>(&mut self, moves: impl Iterator<Item = &'a MoveAnalysis>) {
        let mut previous_forcing = false;
        let mut previous_quiet_eval: Option<i32> = None;
        let mut streak = 0u32;
        let mut longest = 0u32;

        for m in moves {
            let features = &m.features;
            self.moves += 1;
            self.pieces[piece_index(features.piece)] += 1;
            if features.forcing {
                self.forcing += 1;
                if previous_forcing {
                    self.sustained += 1;
                }
            }
            if features.quiet {
                self.quiet += 1;
            }
            if features.is_sacrifice() {
                self.sacrifices += 1;
            }
            if m.brilliant {
                self.brilliants += 1;
            }
            if features.repeated_position || features.reverses_previous {
                self.repeats += 1;
            }
            previous_forcing = features.forcing;

            let (Some(loss), Some(class)) = (m.cp_loss, m.classification) else {
                continue;
            };
            self.analyzed += 1;
            if class.is_error() {
                self.errors += 1;
            }

            if features.is_tactical() {
                self.tactical_losses.push(loss);
                if class.is_top_move() {
                    self.tactical_top += 1;
                }
                if features.forcing {
                    self.forcing_analyzed += 1;
                    if class.is_error() {
                        self.forcing_errors += 1;
                    }
                }
                streak = 0;
            } else {
                self.quiet_losses.push(loss);
                if let Some(eval) = m.eval_after {
                    let eval = eval.clamp(-MAX_CP_LOSS, MAX_CP_LOSS);
                    if let Some(previous) = previous_quiet_eval {
                        self.quiet_drift.push(eval - previous);
                    }
                    previous_quiet_eval = Some(eval);
                }
                if loss <= STREAK_MAX_LOSS {
                    streak += 1;
                    longest = longest.max(streak);
                } else {
                    streak = 0;
                }
            }
        }

        self.longest_streaks.push(longest);
    }

    fn ratio(&self, count: u32) -> f64 {
        if self.moves == 0 {
            0.0
        } else {
            count as f64 / self.moves as f64
        }
    }

    /// Normalized entropy of the piece types moved, 0 (one piece only) to 1.
    fn piece_diversity(&self) -> f64 {
        if self.moves == 0 {
            return 0.0;
        }
        let total = self.moves as f64;
        let entropy: f64 = self
            .pieces
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total;
                -p * p.ln()
            })
            .sum();
        entropy / (self.pieces.len() as f64).ln()
    }

    fn opening_diversity(&self) -> f64 {
        if self.games < 2 {
            return 0.5;
        }
        let distinct = self.openings.len().max(1) as f64;
        ((distinct - 1.0) / (self.games as f64 - 1.0)).min(1.0)
    }

    fn diversity(&self) -> f64 {
        0.6 * self.piece_diversity() + 0.4 * self.opening_diversity()
    }
}

fn piece_index(piece: PieceKind) -> usize {
    match piece {
        PieceKind::Pawn => 0,
        PieceKind::Knight => 1,
        PieceKind::Bishop => 2,
        PieceKind::Rook => 3,
        PieceKind::Queen => 4,
        PieceKind::King => 5,
    }
}

fn mean(values: &[i32]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

fn finish(score: f64) -> f64 {
    round2(score.clamp(0.0, 100.0))
}

/// Score the player's style over the games where their color is known.
pub fn score_personality(games: &[PlayerGame<'_>]) -> PersonalityScores {
    let signals = Signals::collect(games);
    if signals.moves == 0 {
        return PersonalityScores {
            sample_games: signals.games,
            ..PersonalityScores::default()
        };
    }

    let forcing = signals.ratio(signals.forcing);
    let quiet = signals.ratio(signals.quiet);
    let repetition = signals.ratio(signals.repeats);
    let diversity = signals.diversity();
    let sacrifice_rate = signals.ratio(signals.sacrifices);
    let sustain_rate = signals.ratio(signals.sustained);
    let error_rate = if signals.analyzed == 0 {
        0.0
    } else {
        signals.errors as f64 / signals.analyzed as f64
    };
    let creative_rate = signals.ratio(signals.sacrifices + signals.brilliants);

    let aggressive = 50.0 + 40.0 * forcing - 35.0 * quiet
        + (200.0 * sacrifice_rate).min(8.0)
        + 15.0 * sustain_rate;
    let patient = 50.0 + 40.0 * quiet
        - 35.0 * forcing
        - 20.0 * (forcing - 0.5).max(0.0)
        - (10.0 * error_rate).min(5.0);

    let novelty = 35.0 + 30.0 * diversity - 60.0 * repetition + (100.0 * creative_rate).min(12.0);
    let staleness = 50.0 + 60.0 * repetition - 25.0 * diversity + 15.0 * quiet;

    PersonalityScores {
        tactical: finish(tactical_score(&signals)),
        positional: finish(positional_score(&signals)),
        aggressive: finish(aggressive),
        patient: finish(patient),
        novelty: finish(novelty),
        staleness: finish(staleness),
        sample_moves: signals.moves,
        sample_games: signals.games,
    }
}

fn tactical_score(signals: &Signals) -> f64 {
    let Some(mean_loss) = mean(&signals.tactical_losses) else {
        return NEUTRAL_SCORE;
    };
    let sampled = signals.tactical_losses.len() as f64;
    let top_rate = signals.tactical_top as f64 / sampled;
    let forcing_error_rate = if signals.forcing_analyzed == 0 {
        0.0
    } else {
        signals.forcing_errors as f64 / signals.forcing_analyzed as f64
    };
    let brilliance = (30.0 * signals.brilliants as f64 / signals.games.max(1) as f64).min(10.0);

    0.7 * accuracy_from_cp_loss(mean_loss) + 15.0 * top_rate - 30.0 * forcing_error_rate + brilliance
}

fn positional_score(signals: &Signals) -> f64 {
    let Some(mean_loss) = mean(&signals.quiet_losses) else {
        return NEUTRAL_SCORE;
    };
    let drift_penalty = mean(&signals.quiet_drift)
        .map(|drift| ((-drift).max(0.0) / 5.0).min(15.0))
        .unwrap_or_default();
    let streaks: Vec<i32> = signals.longest_streaks.iter().map(|&s| s as i32).collect();
    let streak_bonus = mean(&streaks).map(|s| (s / 2.0).min(15.0)).unwrap_or_default();

    0.75 * accuracy_from_cp_loss(mean_loss) - drift_penalty + streak_bonus
}
