//! Opening repertoire: results and recurring mistakes per opening the
//! player actually chose.
//!
//! A game only counts toward an opening when the player owns it. A named
//! defence belongs to Black, everything else to White. When the reported
//! name belongs to the opponent, the game is filed under the family of the
//! player's own first move instead.

use std::collections::HashMap;

use chess::PieceColor;
use serde::{Deserialize, Serialize};

use crate::aggregator::{round2, scoped_accuracy};
use crate::classification::MoveClassification;
use crate::move_analyzer::MoveAnalysis;
use crate::player::{Outcome, PlayerGame};

/// Words that mark an opening as Black's choice.
const BLACK_MARKERS: &[&str] = &[
    "Defense",
    "Indian",
    "Countergambit",
    "Declined",
    "Accepted",
    "Sicilian",
    "French",
    "Caro-Kann",
    "Scandinavian",
    "Alekhine",
    "Pirc",
    "Dutch",
    "Slav",
    "Benoni",
    "Benko",
    "Budapest",
    "Petrov",
    "Russian Game",
    "Philidor",
    "Grunfeld",
    "Owen",
];

/// Canonical form of a reported opening name: no ECO code, no variation,
/// American spelling, single spaces. `None` for empty or placeholder names.
pub fn normalize_opening_name(raw: &str) -> Option<String> {
    let name = strip_eco(raw.trim());
    let base = name.split([':', ',']).next().unwrap_or_default();
    let normalized = base
        .replace("Defence", "Defense")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if normalized.is_empty() || normalized == "?" || normalized.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(normalized)
    }
}

fn strip_eco(name: &str) -> &str {
    let bytes = name.as_bytes();
    let is_eco = bytes.len() >= 3
        && (b'A'..=b'E').contains(&bytes[0])
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes.get(3).map_or(true, |b| !b.is_ascii_alphanumeric());
    if is_eco {
        name[3..].trim_start_matches([':', '-', ' '])
    } else {
        name
    }
}

/// Which side chooses a (normalized) opening.
pub fn opening_owner(name: &str) -> PieceColor {
    if name.contains("Attack") {
        return PieceColor::White;
    }
    if BLACK_MARKERS.iter().any(|marker| name.contains(marker)) {
        PieceColor::Black
    } else {
        PieceColor::White
    }
}

/// Opening family implied by the player's own first move (and, for Black,
/// the move it answers). `None` if the game did not start from move one for
/// that side, e.g. when replayed from a later position.
pub fn opening_family(moves: &[MoveAnalysis], color: PieceColor) -> Option<String> {
    let first_move_of = |side: PieceColor| {
        moves
            .iter()
            .find(|m| m.color == side && m.move_number == 1)
            .map(|m| m.played_san.trim_end_matches(['+', '#']))
    };
    let first = first_move_of(PieceColor::White)?;

    let family = match color {
        PieceColor::White => match first {
            "e4" => "King's Pawn Opening",
            "d4" => "Queen's Pawn Opening",
            "c4" => "English Opening",
            "Nf3" => "Reti Opening",
            "f4" => "Bird's Opening",
            "b3" => "Nimzo-Larsen Attack",
            "g3" => "King's Fianchetto Opening",
            "b4" => "Polish Opening",
            _ => "Irregular Opening",
        },
        PieceColor::Black => match (first, first_move_of(PieceColor::Black)?) {
            ("e4", "c5") => "Sicilian Defense",
            ("e4", "e6") => "French Defense",
            ("e4", "c6") => "Caro-Kann Defense",
            ("e4", "d5") => "Scandinavian Defense",
            ("e4", "Nf6") => "Alekhine Defense",
            ("e4", "d6") => "Pirc Defense",
            ("e4", "g6") | ("d4", "g6") => "Modern Defense",
            ("e4", "e5") => "Open Game",
            ("e4", "Nc6") => "Nimzowitsch Defense",
            ("d4", "Nf6") => "Indian Defense",
            ("d4", "d5") => "Closed Game",
            ("d4", "f5") => "Dutch Defense",
            ("d4", "c5") => "Benoni Defense",
            ("d4", "e6") => "Horwitz Defense",
            ("c4", "e5") => "Reversed Sicilian",
            ("c4", "c5") => "Symmetrical English",
            ("c4", "Nf6") => "Anglo-Indian Defense",
            _ => "Irregular Defense",
        },
    };
    Some(family.to_string())
}

/// The opening this game counts under for the player, or `None` when the
/// game must be left out (unknown color, no own moves).
pub fn player_opening(game: &PlayerGame<'_>) -> Option<String> {
    let color = game.color?;
    if let Some(name) = game.opening.and_then(normalize_opening_name) {
        if opening_owner(&name) == color {
            return Some(name);
        }
    }
    opening_family(&game.summary.moves, color)
}

/// An error the player made in one of their games with an opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningMistake {
    pub game_id: String,
    pub ply: u32,
    pub move_number: u32,
    pub played: String,
    /// Only set when it differs from `played`.
    pub best: Option<String>,
    pub classification: MoveClassification,
    pub cp_loss: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningStats {
    pub name: String,
    pub color: PieceColor,
    pub games: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    /// Percent of finished games.
    pub win_rate: Option<f64>,
    pub draw_rate: Option<f64>,
    pub loss_rate: Option<f64>,
    /// Accuracy over the player's analyzed moves in these games.
    pub accuracy: Option<f64>,
    pub mistakes: Vec<OpeningMistake>,
}

#[derive(Default)]
struct Group<'a> {
    games: u32,
    wins: u32,
    draws: u32,
    losses: u32,
    moves: Vec<&'a MoveAnalysis>,
    mistakes: Vec<OpeningMistake>,
}

/// Results per (opening, color) over the games where the player chose the
/// opening. Most played first.
pub fn analyze_repertoire(games: &[PlayerGame<'_>]) -> Vec<OpeningStats> {
    let mut groups: HashMap<(String, PieceColor), Group<'_>> = HashMap::new();

    for game in games {
        let Some(color) = game.color else {
            tracing::debug!(game_id = %game.summary.game_id, "skipping game without player color");
            continue;
        };
        let Some(name) = player_opening(game) else {
            continue;
        };

        let group = groups.entry((name, color)).or_default();
        group.games += 1;
        match game.outcome() {
            Some(Outcome::Win) => group.wins += 1,
            Some(Outcome::Draw) => group.draws += 1,
            Some(Outcome::Loss) => group.losses += 1,
            None => {}
        }
        group.moves.extend(game.own_moves());
        group.mistakes.extend(extract_mistakes(game));
    }

    let mut stats: Vec<OpeningStats> = groups
        .into_iter()
        .map(|((name, color), group)| {
            let finished = group.wins + group.draws + group.losses;
            let rate = |n: u32| (finished > 0).then(|| round2(n as f64 * 100.0 / finished as f64));
            OpeningStats {
                name,
                color,
                games: group.games,
                wins: group.wins,
                draws: group.draws,
                losses: group.losses,
                win_rate: rate(group.wins),
                draw_rate: rate(group.draws),
                loss_rate: rate(group.losses),
                accuracy: scoped_accuracy(group.moves.iter().copied()),
                mistakes: group.mistakes,
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.games
            .cmp(&a.games)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| (a.color == PieceColor::Black).cmp(&(b.color == PieceColor::Black)))
    });
    stats
}

/// The player's inaccuracies, mistakes and blunders in one game.
pub fn extract_mistakes(game: &PlayerGame<'_>) -> Vec<OpeningMistake> {
    game.own_moves()
        .filter_map(|m| {
            let classification = m.classification.filter(|c| c.is_error())?;
            Some(OpeningMistake {
                game_id: game.summary.game_id.clone(),
                ply: m.ply,
                move_number: m.move_number,
                played: m.played_san.clone(),
                best: m.best_move_san.clone().filter(|best| *best != m.played_san),
                classification,
                cp_loss: m.cp_loss.unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::summarize_game;
    use crate::aggregator::tests::analyzed;
    use crate::aggregator::GameSummary;
    use chess::GameResult;

    /// A game whose plies are `sans`, each with the matching loss.
    fn summary(id: &str, sans: &[&str], losses: &[i32]) -> GameSummary {
        let moves = sans
            .iter()
            .zip(losses)
            .enumerate()
            .map(|(i, (san, &loss))| {
                let mut m = analyzed(i as u32 + 1, loss);
                m.played_san = san.to_string();
                m
            })
            .collect();
        summarize_game(id, moves, None)
    }

    fn player_game<'a>(
        summary: &'a GameSummary,
        color: Option<PieceColor>,
        opening: &'a str,
        result: GameResult,
    ) -> PlayerGame<'a> {
        PlayerGame {
            opening: Some(opening),
            result: Some(result),
            ..PlayerGame::new(summary, color)
        }
    }

    #[test]
    fn test_normalize_opening_name() {
        assert_eq!(
            normalize_opening_name("B12 Caro-Kann Defence: Advance Variation").as_deref(),
            Some("Caro-Kann Defense")
        );
        assert_eq!(
            normalize_opening_name("  Sicilian   Defense, Najdorf ").as_deref(),
            Some("Sicilian Defense")
        );
        assert_eq!(normalize_opening_name("C50").as_deref(), None);
        assert_eq!(normalize_opening_name("?"), None);
        assert_eq!(
            normalize_opening_name("Italian Game").as_deref(),
            Some("Italian Game")
        );
    }

    #[test]
    fn test_opening_owner() {
        assert_eq!(opening_owner("Caro-Kann Defense"), PieceColor::Black);
        assert_eq!(opening_owner("Queen's Gambit Declined"), PieceColor::Black);
        assert_eq!(opening_owner("King's Indian Attack"), PieceColor::White);
        assert_eq!(opening_owner("Ruy Lopez"), PieceColor::White);
        assert_eq!(opening_owner("Nimzo-Indian Defense"), PieceColor::Black);
    }

    #[test]
    fn test_opponents_caro_kann_is_not_the_players_opening() {
        let game = summary("g1", &["e4", "c6", "d4", "d5"], &[0, 0, 0, 0]);
        let as_white = player_game(
            &game,
            Some(PieceColor::White),
            "B12 Caro-Kann Defense: Advance Variation",
            GameResult::WhiteWins,
        );

        let stats = analyze_repertoire(&[as_white]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "King's Pawn Opening");
        assert_eq!(stats[0].color, PieceColor::White);
        assert!(stats.iter().all(|s| s.name != "Caro-Kann Defense"));

        // The same game from Black's side is a Caro-Kann
        let as_black = PlayerGame {
            color: Some(PieceColor::Black),
            ..as_white
        };
        let stats = analyze_repertoire(&[as_black]);
        assert_eq!(stats[0].name, "Caro-Kann Defense");
        assert_eq!(stats[0].losses, 1);
    }

    #[test]
    fn test_unknown_color_is_excluded() {
        let game = summary("g1", &["e4", "c5"], &[0, 0]);
        let unknown = player_game(&game, None, "Sicilian Defense", GameResult::Draw);
        assert!(analyze_repertoire(&[unknown]).is_empty());
        assert_eq!(player_opening(&unknown), None);
    }

    #[test]
    fn test_family_from_own_moves_without_tag() {
        let game = summary("g1", &["d4", "f5"], &[0, 0]);
        let white = PlayerGame::new(&game, Some(PieceColor::White));
        let black = PlayerGame::new(&game, Some(PieceColor::Black));
        assert_eq!(player_opening(&white).as_deref(), Some("Queen's Pawn Opening"));
        assert_eq!(player_opening(&black).as_deref(), Some("Dutch Defense"));
    }

    #[test]
    fn test_family_follows_colors_when_black_moves_first() {
        // Replayed from a position after 1. e4 with Black to move
        let mut game = summary("g1", &["c5", "Nf3", "d6"], &[0, 0, 300]);
        for (m, (color, number)) in game.moves.iter_mut().zip([
            (PieceColor::Black, 1),
            (PieceColor::White, 2),
            (PieceColor::Black, 2),
        ]) {
            m.color = color;
            m.move_number = number;
        }
        let white = PlayerGame::new(&game, Some(PieceColor::White));
        let black = PlayerGame::new(&game, Some(PieceColor::Black));
        assert_eq!(opening_family(&game.moves, PieceColor::White), None);
        assert_eq!(player_opening(&black), None);
        assert_eq!(player_opening(&white), None);

        // A tag still names the player's own opening
        let tagged = player_game(&game, Some(PieceColor::Black), "Sicilian Defense", GameResult::Draw);
        assert_eq!(player_opening(&tagged).as_deref(), Some("Sicilian Defense"));

        let mistakes = extract_mistakes(&black);
        assert_eq!(mistakes.len(), 1);
        assert_eq!((mistakes[0].ply, mistakes[0].move_number), (3, 2));
    }

    #[test]
    fn test_results_and_mistakes_per_opening() {
        let mut first = summary(
            "g1",
            &["e4", "c5", "Nf3", "d6", "d4", "Qa5+"],
            &[0, 0, 0, 120, 0, 450],
        );
        first.moves[5].best_move_san = Some("cxd4".into());
        let second = summary("g2", &["e4", "c5", "Nc3", "Nc6"], &[0, 10, 300, 0]);

        let games = [
            player_game(&first, Some(PieceColor::Black), "Sicilian Defense", GameResult::WhiteWins),
            player_game(&second, Some(PieceColor::Black), "Sicilian Defence", GameResult::BlackWins),
        ];
        let stats = analyze_repertoire(&games);
        assert_eq!(stats.len(), 1);

        let sicilian = &stats[0];
        assert_eq!(sicilian.name, "Sicilian Defense");
        assert_eq!(sicilian.games, 2);
        assert_eq!((sicilian.wins, sicilian.draws, sicilian.losses), (1, 0, 1));
        assert_eq!(sicilian.win_rate, Some(50.0));

        // White's 300cp slip in the second game is not the player's
        let plies: Vec<(String, u32)> = sicilian
            .mistakes
            .iter()
            .map(|m| (m.game_id.clone(), m.ply))
            .collect();
        assert_eq!(plies, vec![("g1".to_string(), 4), ("g1".to_string(), 6)]);
        assert_eq!(sicilian.mistakes[1].played, "Qa5+");
        assert_eq!(sicilian.mistakes[1].best.as_deref(), Some("cxd4"));
        assert_eq!(sicilian.mistakes[1].move_number, 3);
        assert_eq!(sicilian.mistakes[0].best, None);
    }

    #[test]
    fn test_most_played_first() {
        let a = summary("a", &["e4", "e5"], &[0, 0]);
        let b = summary("b", &["d4", "d5"], &[0, 0]);
        let c = summary("c", &["d4", "Nf6"], &[0, 0]);
        let games = [
            PlayerGame::new(&a, Some(PieceColor::White)),
            PlayerGame::new(&b, Some(PieceColor::White)),
            PlayerGame::new(&c, Some(PieceColor::White)),
        ];
        let stats = analyze_repertoire(&games);
        assert_eq!(stats[0].name, "Queen's Pawn Opening");
        assert_eq!(stats[0].games, 2);
        assert_eq!(stats[0].win_rate, None);
    }
}
