//! Rolls a game's move analyses up into a [`GameSummary`].

use chess::{PieceColor, Truncation};
use serde::{Deserialize, Serialize};

use crate::classification::MoveClassification;
use crate::move_analyzer::MoveAnalysis;

/// Plies 1 through this one are the opening.
pub const OPENING_LAST_PLY: u32 = 20;
/// The endgame starts once the non-pawn material of both sides drops below
/// this many centipawns.
pub const ENDGAME_NON_PAWN_CP: i32 = 2600;

/// Accuracy in percent for a mean centipawn loss.
///
/// `80 * 2^(-L/50) + 20` up to 100cp (100 at 0, 60 at 50, 40 at 100), then
/// falling linearly to 0 at 150cp.
pub fn accuracy_from_cp_loss(mean_loss: f64) -> f64 {
    let loss = mean_loss.max(0.0);
    if loss <= 100.0 {
        80.0 * 2f64.powf(-loss / 50.0) + 20.0
    } else if loss < 150.0 {
        40.0 * (150.0 - loss) / 50.0
    } else {
        0.0
    }
}

/// Two decimals, applied to every float that leaves this crate.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

/// Where the phases of one game begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    /// First middlegame ply, if the game got that far.
    pub middlegame_start: Option<u32>,
    pub endgame_start: Option<u32>,
}

impl PhaseBoundaries {
    /// Plies are phased by count first; the endgame begins at the first
    /// post-opening ply played with non-pawn material under the threshold.
    pub fn detect(moves: &[MoveAnalysis]) -> Self {
        let middlegame_start = moves
            .iter()
            .map(|m| m.ply)
            .find(|&ply| ply > OPENING_LAST_PLY);
        let endgame_start = moves
            .iter()
            .find(|m| m.ply > OPENING_LAST_PLY && m.features.non_pawn_material < ENDGAME_NON_PAWN_CP)
            .map(|m| m.ply);
        Self {
            middlegame_start,
            endgame_start,
        }
    }

    pub fn phase_of(&self, ply: u32) -> GamePhase {
        if ply <= OPENING_LAST_PLY {
            GamePhase::Opening
        } else if self.endgame_start.is_some_and(|start| ply >= start) {
            GamePhase::Endgame
        } else {
            GamePhase::Middlegame
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub best: u32,
    pub great: u32,
    pub excellent: u32,
    pub good: u32,
    pub acceptable: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
    /// Counted on top of the tier the move also has.
    pub brilliant: u32,
    pub unanalyzed: u32,
}

impl ClassificationCounts {
    fn record(&mut self, analysis: &MoveAnalysis) {
        let Some(class) = analysis.classification else {
            self.unanalyzed += 1;
            return;
        };
        *self.slot(class) += 1;
        if analysis.brilliant {
            self.brilliant += 1;
        }
    }

    fn slot(&mut self, class: MoveClassification) -> &mut u32 {
        match class {
            MoveClassification::Best => &mut self.best,
            MoveClassification::Great => &mut self.great,
            MoveClassification::Excellent => &mut self.excellent,
            MoveClassification::Good => &mut self.good,
            MoveClassification::Acceptable => &mut self.acceptable,
            MoveClassification::Inaccuracy => &mut self.inaccuracy,
            MoveClassification::Mistake => &mut self.mistake,
            MoveClassification::Blunder => &mut self.blunder,
        }
    }

    pub fn get(&self, class: MoveClassification) -> u32 {
        match class {
            MoveClassification::Best => self.best,
            MoveClassification::Great => self.great,
            MoveClassification::Excellent => self.excellent,
            MoveClassification::Good => self.good,
            MoveClassification::Acceptable => self.acceptable,
            MoveClassification::Inaccuracy => self.inaccuracy,
            MoveClassification::Mistake => self.mistake,
            MoveClassification::Blunder => self.blunder,
        }
    }

    /// Inaccuracies, mistakes and blunders.
    pub fn errors(&self) -> u32 {
        self.inaccuracy + self.mistake + self.blunder
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseAccuracy {
    pub opening: Option<f64>,
    pub middlegame: Option<f64>,
    pub endgame: Option<f64>,
}

/// Accuracy figures for a set of moves: one side, or both together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// `None` when no move in the set was analyzed.
    pub accuracy: Option<f64>,
    pub avg_cp_loss: Option<f64>,
    pub analyzed_moves: u32,
    pub counts: ClassificationCounts,
    pub phases: PhaseAccuracy,
}

impl AccuracyReport {
    fn build<'a>(
        moves: impl Iterator<Item = &'a MoveAnalysis> + Clone,
        phases: &PhaseBoundaries,
    ) -> Self {
        let mut counts = ClassificationCounts::default();
        for analysis in moves.clone() {
            counts.record(analysis);
        }

        let in_phase = |phase: GamePhase| {
            scoped_accuracy(
                moves
                    .clone()
                    .filter(move |m| phases.phase_of(m.ply) == phase),
            )
        };
        let (accuracy, avg_cp_loss, analyzed_moves) = accuracy_of(moves.clone());

        Self {
            accuracy,
            avg_cp_loss,
            analyzed_moves,
            counts,
            phases: PhaseAccuracy {
                opening: in_phase(GamePhase::Opening),
                middlegame: in_phase(GamePhase::Middlegame),
                endgame: in_phase(GamePhase::Endgame),
            },
        }
    }
}

fn accuracy_of<'a>(moves: impl Iterator<Item = &'a MoveAnalysis>) -> (Option<f64>, Option<f64>, u32) {
    let losses: Vec<i32> = moves.filter_map(|m| m.cp_loss).collect();
    if losses.is_empty() {
        return (None, None, 0);
    }
    let mean = losses.iter().map(|&l| l as f64).sum::<f64>() / losses.len() as f64;
    (
        Some(round2(accuracy_from_cp_loss(mean))),
        Some(round2(mean)),
        losses.len() as u32,
    )
}

/// Accuracy over the analyzed moves of an arbitrary subset.
pub fn scoped_accuracy<'a>(moves: impl Iterator<Item = &'a MoveAnalysis>) -> Option<f64> {
    accuracy_of(moves).0
}

/// Per-game aggregate, replaced as a whole when the game is reanalyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: String,
    /// Plies that replayed; fewer than the input when `truncated` is set.
    pub total_plies: u32,
    pub overall: AccuracyReport,
    pub white: AccuracyReport,
    pub black: AccuracyReport,
    pub phases: PhaseBoundaries,
    pub truncated: Option<Truncation>,
    pub moves: Vec<MoveAnalysis>,
}

impl GameSummary {
    pub fn side(&self, color: PieceColor) -> &AccuracyReport {
        match color {
            PieceColor::White => &self.white,
            PieceColor::Black => &self.black,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }

    /// Plies the engine could not score.
    pub fn unanalyzed_plies(&self) -> Vec<u32> {
        self.moves
            .iter()
            .filter(|m| !m.is_analyzed())
            .map(|m| m.ply)
            .collect()
    }

    pub fn moves_by(&self, color: PieceColor) -> impl Iterator<Item = &MoveAnalysis> + Clone {
        self.moves.iter().filter(move |m| m.color == color)
    }
}

/// Build the summary of one game from its ply-ordered analyses.
pub fn summarize_game(
    game_id: impl Into<String>,
    moves: Vec<MoveAnalysis>,
    truncated: Option<Truncation>,
) -> GameSummary {
    let phases = PhaseBoundaries::detect(&moves);
    let overall = AccuracyReport::build(moves.iter(), &phases);
    let white = AccuracyReport::build(
        moves.iter().filter(|m| m.color == PieceColor::White),
        &phases,
    );
    let black = AccuracyReport::build(
        moves.iter().filter(|m| m.color == PieceColor::Black),
        &phases,
    );

    GameSummary {
        game_id: game_id.into(),
        total_plies: moves.len() as u32,
        overall,
        white,
        black,
        phases,
        truncated,
        moves,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::depth::Complexity;
    use crate::features::MoveFeatures;
    use crate::move_analyzer::AnalysisStatus;
    use chess::PieceKind;
    use proptest::prelude::*;

    /// Analyzed move with the given loss and default features.
    pub(crate) fn analyzed(ply: u32, cp_loss: i32) -> MoveAnalysis {
        MoveAnalysis {
            ply,
            move_number: ply.div_ceil(2),
            color: if ply % 2 == 1 {
                PieceColor::White
            } else {
                PieceColor::Black
            },
            played_san: format!("m{ply}"),
            played_uci: format!("u{ply}"),
            eval_before: Some(0),
            eval_after: Some(-cp_loss),
            cp_loss: Some(cp_loss),
            classification: Some(MoveClassification::from_cp_loss(cp_loss)),
            brilliant: false,
            best_move_san: None,
            best_move_uci: None,
            depth: Some(14),
            partial: false,
            status: AnalysisStatus::Analyzed,
            features: MoveFeatures {
                piece: PieceKind::Knight,
                capture: false,
                check: false,
                threat: false,
                castle: false,
                promotion: false,
                forcing: false,
                quiet: true,
                sacrificed: 0,
                complexity: Complexity::Normal,
                repeated_position: false,
                reverses_previous: false,
                material_balance: 0,
                non_pawn_material: 6200,
            },
        }
    }

    pub(crate) fn unanalyzed(ply: u32) -> MoveAnalysis {
        let mut analysis = analyzed(ply, 0);
        analysis.eval_before = None;
        analysis.eval_after = None;
        analysis.cp_loss = None;
        analysis.classification = None;
        analysis.depth = None;
        analysis.status = AnalysisStatus::Unanalyzed {
            reason: "engine unavailable".into(),
            retryable: true,
        };
        analysis
    }

    #[test]
    fn test_accuracy_curve_anchors() {
        assert_eq!(accuracy_from_cp_loss(0.0), 100.0);
        assert!((accuracy_from_cp_loss(50.0) - 60.0).abs() < 1e-9);
        assert!((accuracy_from_cp_loss(100.0) - 40.0).abs() < 1e-9);
        assert_eq!(accuracy_from_cp_loss(150.0), 0.0);
        assert_eq!(accuracy_from_cp_loss(900.0), 0.0);
        // Continuous at the joint
        assert!((accuracy_from_cp_loss(100.0001) - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_phases_by_ply_and_material() {
        let mut moves: Vec<_> = (1..=40).map(|ply| analyzed(ply, 10)).collect();
        for m in moves.iter_mut().filter(|m| m.ply >= 31) {
            m.features.non_pawn_material = 2000;
        }
        // Material already low in the opening does not start the endgame early
        moves[5].features.non_pawn_material = 1000;

        let phases = PhaseBoundaries::detect(&moves);
        assert_eq!(phases.middlegame_start, Some(21));
        assert_eq!(phases.endgame_start, Some(31));
        assert_eq!(phases.phase_of(20), GamePhase::Opening);
        assert_eq!(phases.phase_of(21), GamePhase::Middlegame);
        assert_eq!(phases.phase_of(35), GamePhase::Endgame);
    }

    #[test]
    fn test_summary_counts_and_sides() {
        let mut moves = vec![
            analyzed(1, 0),
            analyzed(2, 450),
            analyzed(3, 30),
            unanalyzed(4),
            analyzed(5, 150),
        ];
        moves[0].brilliant = true;

        let summary = summarize_game("g1", moves, None);
        assert_eq!(summary.total_plies, 5);
        assert_eq!(summary.overall.counts.best, 1);
        assert_eq!(summary.overall.counts.brilliant, 1);
        assert_eq!(summary.overall.counts.blunder, 1);
        assert_eq!(summary.overall.counts.unanalyzed, 1);
        assert_eq!(summary.overall.counts.errors(), 2);
        assert_eq!(summary.unanalyzed_plies(), vec![4]);

        // White: 0, 30, 150 -> mean 60
        assert_eq!(summary.white.avg_cp_loss, Some(60.0));
        assert_eq!(summary.white.analyzed_moves, 3);
        // Black: a single blunder
        assert_eq!(summary.side(PieceColor::Black).accuracy, Some(0.0));
        assert_eq!(summary.white.phases.middlegame, None);
    }

    #[test]
    fn test_truncated_game_keeps_prefix() {
        let truncation = Truncation {
            ply: 3,
            token: "Qxx9".into(),
            reason: "Illegal move".into(),
        };
        let summary = summarize_game("g2", vec![analyzed(1, 0), analyzed(2, 0)], Some(truncation));
        assert!(summary.is_truncated());
        assert_eq!(summary.total_plies, 2);
        assert_eq!(summary.overall.accuracy, Some(100.0));
    }

    #[test]
    fn test_empty_game_has_no_accuracy() {
        let summary = summarize_game("g3", Vec::new(), None);
        assert_eq!(summary.overall.accuracy, None);
        assert_eq!(summary.phases.middlegame_start, None);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = summarize_game("g4", vec![analyzed(1, 12)], None);
        let json = serde_json::to_string(&summary).unwrap();
        let back: GameSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    proptest! {
        #[test]
        fn test_accuracy_is_monotonic(a in 0.0f64..400.0, b in 0.0f64..400.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(accuracy_from_cp_loss(lo) >= accuracy_from_cp_loss(hi));
        }
    }
}
