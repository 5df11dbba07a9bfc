//! Per-ply engine analysis: centipawn loss, classification, brilliancy and
//! the best-move suggestion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess::{AnalysisScore, PieceColor, PlayedMove, MATE_CP};
use cozy_chess::GameStatus;
use engine::{EngineError, EnginePool, EvaluatorFactory};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::brilliant::{is_brilliant, BrilliantCandidate};
use crate::classification::MoveClassification;
use crate::depth::DepthPolicy;
use crate::error::AnalysisError;
use crate::features::{extract_features, MoveFeatures};

/// Centipawn loss is capped here so one lost position cannot swamp a
/// game's average.
pub const MAX_CP_LOSS: i32 = 1000;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub depth_policy: DepthPolicy,
    /// Soft cap per evaluation.
    pub time_budget: Duration,
    /// Plies of one game evaluated at the same time.
    pub move_concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            depth_policy: DepthPolicy::default(),
            time_budget: Duration::from_secs(5),
            move_concurrency: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzed,
    /// The engine could not score this ply. `retryable` failures may
    /// succeed if the ply is tried again later.
    Unanalyzed { reason: String, retryable: bool },
}

/// Verdict on one ply.
///
/// Evaluations are centipawns from the mover's point of view, with forced
/// mates mapped near [`MATE_CP`]. Every engine-derived field is `None` when
/// the ply is unanalyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAnalysis {
    pub ply: u32,
    /// Full-move number as printed in PGN, counted from the start position.
    pub move_number: u32,
    pub color: PieceColor,
    pub played_san: String,
    pub played_uci: String,
    pub eval_before: Option<i32>,
    pub eval_after: Option<i32>,
    pub cp_loss: Option<i32>,
    pub classification: Option<MoveClassification>,
    pub brilliant: bool,
    /// Engine's preferred move, only when it is not the move played.
    pub best_move_san: Option<String>,
    pub best_move_uci: Option<String>,
    pub depth: Option<u8>,
    /// At least one evaluation was cut short by the time budget.
    pub partial: bool,
    pub status: AnalysisStatus,
    pub features: MoveFeatures,
}

impl MoveAnalysis {
    fn unanalyzed(played: &PlayedMove, features: MoveFeatures, error: &EngineError) -> Self {
        Self {
            ply: played.ply,
            move_number: played.move_number,
            color: played.color,
            played_san: played.san.clone(),
            played_uci: played.uci.clone(),
            eval_before: None,
            eval_after: None,
            cp_loss: None,
            classification: None,
            brilliant: false,
            best_move_san: None,
            best_move_uci: None,
            depth: None,
            partial: false,
            status: AnalysisStatus::Unanalyzed {
                reason: error.to_string(),
                retryable: error.is_retryable(),
            },
            features,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.status == AnalysisStatus::Analyzed
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.status, AnalysisStatus::Unanalyzed { retryable: true, .. })
    }

    /// Check that the record does not contradict itself: no suggestion equal
    /// to the played move, a tier that matches the loss, and no verdict on an
    /// unanalyzed ply.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let violation = |detail: &str| -> Result<(), AnalysisError> {
            Err(AnalysisError::ClassificationInvariantViolation {
                ply: self.ply,
                played: self.played_san.clone(),
                detail: detail.to_string(),
            })
        };

        if self.best_move_san.as_deref() == Some(self.played_san.as_str())
            || self.best_move_uci.as_deref() == Some(self.played_uci.as_str())
        {
            return violation("best move suggestion is the move played");
        }
        if let (Some(loss), Some(class)) = (self.cp_loss, self.classification) {
            if class != MoveClassification::from_cp_loss(loss) {
                return violation("classification does not match centipawn loss");
            }
        }
        if !self.is_analyzed() && (self.classification.is_some() || self.brilliant) {
            return violation("unanalyzed move carries a verdict");
        }
        Ok(())
    }
}

/// Loss from the mover's point of view, in `0..=MAX_CP_LOSS`.
///
/// Going from one forced mate to another for the same side costs nothing,
/// and neither does delivering mate.
pub fn centipawn_loss(before: AnalysisScore, after: AnalysisScore, delivered_mate: bool) -> i32 {
    if delivered_mate {
        return 0;
    }
    if let (AnalysisScore::Mate(b), AnalysisScore::Mate(a)) = (before, after) {
        if (b > 0) == (a > 0) {
            return 0;
        }
    }
    (before.to_cp() - after.to_cp()).clamp(0, MAX_CP_LOSS)
}

/// Analyzes the moves of one game against a shared engine pool.
pub struct MoveAnalyzer<F: EvaluatorFactory> {
    pool: EnginePool<F>,
    config: AnalyzerConfig,
}

impl<F: EvaluatorFactory> Clone for MoveAnalyzer<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
        }
    }
}

impl<F: EvaluatorFactory> MoveAnalyzer<F> {
    pub fn new(pool: EnginePool<F>, config: AnalyzerConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &EnginePool<F> {
        &self.pool
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// One analysis per ply, in ply order. Engine failures leave single plies
    /// unanalyzed; only cancellation fails the whole game.
    pub async fn analyze_game(
        &self,
        game_id: &str,
        moves: &[PlayedMove],
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<MoveAnalysis>, AnalysisError> {
        let features = extract_features(moves);
        let targets: Vec<usize> = (0..moves.len()).collect();
        self.run(game_id, moves, &features, targets, cancel).await
    }

    /// Re-run the plies whose failure was retryable and return the merged
    /// list. Earlier verdicts are kept as they were.
    pub async fn retry_unanalyzed(
        &self,
        game_id: &str,
        moves: &[PlayedMove],
        analyses: Vec<MoveAnalysis>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<MoveAnalysis>, AnalysisError> {
        let targets: Vec<usize> = analyses
            .iter()
            .enumerate()
            .filter(|(_, analysis)| analysis.is_retryable())
            .map(|(index, _)| index)
            .collect();
        if targets.is_empty() {
            return Ok(analyses);
        }

        tracing::info!(game_id, plies = targets.len(), "retrying unanalyzed plies");
        let features: Vec<MoveFeatures> = analyses.iter().map(|a| a.features.clone()).collect();
        let retried = self.run(game_id, moves, &features, targets, cancel).await?;

        let mut merged = analyses;
        for analysis in retried {
            let index = analysis.ply as usize - 1;
            merged[index] = analysis;
        }
        Ok(merged)
    }

    async fn run(
        &self,
        game_id: &str,
        moves: &[PlayedMove],
        features: &[MoveFeatures],
        targets: Vec<usize>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<MoveAnalysis>, AnalysisError> {
        let permits = Arc::new(Semaphore::new(self.config.move_concurrency.max(1)));
        let expected = targets.len();
        let mut tasks = JoinSet::new();

        for index in targets {
            let pool = self.pool.clone();
            let config = self.config.clone();
            let played = moves[index].clone();
            let features = features[index].clone();
            let permits = Arc::clone(&permits);
            let cancel = Arc::clone(cancel);
            let game_id = game_id.to_string();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return None;
                };
                if cancel.load(Ordering::SeqCst) {
                    return None;
                }
                Some(analyze_ply(&pool, &config, &game_id, &played, features).await)
            });
        }

        let mut results = Vec::with_capacity(expected);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(analysis)) => results.push(analysis),
                Ok(None) => {}
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => tracing::error!(game_id, error = %err, "ply task aborted"),
            }
        }

        if results.len() < expected {
            tracing::info!(game_id, done = results.len(), expected, "game analysis cancelled");
            return Err(AnalysisError::Cancelled);
        }

        results.sort_by_key(|analysis| analysis.ply);
        Ok(results)
    }
}

async fn analyze_ply<F: EvaluatorFactory>(
    pool: &EnginePool<F>,
    config: &AnalyzerConfig,
    game_id: &str,
    played: &PlayedMove,
    features: MoveFeatures,
) -> MoveAnalysis {
    let depth = config.depth_policy.depth_for(&played.board_before);

    let before = match pool
        .evaluate(&played.fen_before, depth, config.time_budget)
        .await
    {
        Ok(evaluation) => evaluation,
        Err(err) => {
            tracing::warn!(game_id, ply = played.ply, error = %err, "move left unanalyzed");
            return MoveAnalysis::unanalyzed(played, features, &err);
        }
    };

    let delivered_mate = played.board_after.status() == GameStatus::Won;
    let (score_after, pv_after, partial_after) = match played.board_after.status() {
        GameStatus::Won => (AnalysisScore::Mate(0), Vec::new(), false),
        GameStatus::Drawn => (AnalysisScore::Centipawns(0), Vec::new(), false),
        GameStatus::Ongoing => match pool
            .evaluate(&played.fen_after, depth, config.time_budget)
            .await
        {
            Ok(evaluation) => (
                evaluation.score_for(played.color),
                evaluation.pv,
                evaluation.partial,
            ),
            Err(err) => {
                tracing::warn!(game_id, ply = played.ply, error = %err, "move left unanalyzed");
                return MoveAnalysis::unanalyzed(played, features, &err);
            }
        },
    };

    let score_before = before.score_for(played.color);
    let cp_loss = centipawn_loss(score_before, score_after, delivered_mate);
    let classification = MoveClassification::from_cp_loss(cp_loss);
    let brilliant = !delivered_mate
        && is_brilliant(&BrilliantCandidate {
            played,
            sacrificed: features.sacrificed,
            cp_loss,
            score_after,
            pv_after: &pv_after,
        });

    let best = before
        .best_move
        .filter(|best| best.uci != played.uci && best.san != played.san);

    tracing::debug!(
        game_id,
        ply = played.ply,
        san = %played.san,
        depth,
        cp_loss,
        %classification,
        brilliant,
        "move analyzed"
    );

    let analysis = MoveAnalysis {
        ply: played.ply,
        move_number: played.move_number,
        color: played.color,
        played_san: played.san.clone(),
        played_uci: played.uci.clone(),
        eval_before: Some(score_before.to_cp()),
        eval_after: Some(if delivered_mate {
            MATE_CP
        } else {
            score_after.to_cp()
        }),
        cp_loss: Some(cp_loss),
        classification: Some(classification),
        brilliant,
        best_move_uci: best.as_ref().map(|b| b.uci.clone()),
        best_move_san: best.map(|b| b.san),
        depth: Some(before.depth),
        partial: before.partial || partial_after,
        status: AnalysisStatus::Analyzed,
        features,
    };
    debug_assert_eq!(analysis.validate(), Ok(()));
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chess::{format_fen, replay, Replay, STARTING_FEN};
    use engine::{MockEngineFactory, MockReply, PoolConfig};
    use proptest::prelude::*;

    fn pool_config() -> PoolConfig {
        PoolConfig {
            max_size: 2,
            retry_backoff: Duration::from_millis(1),
            ..PoolConfig::default()
        }
    }

    fn analyzer(factory: MockEngineFactory, move_concurrency: usize) -> MoveAnalyzer<MockEngineFactory> {
        MoveAnalyzer::new(
            EnginePool::new(factory, pool_config()),
            AnalyzerConfig {
                depth_policy: DepthPolicy::fixed(12),
                time_budget: Duration::from_secs(5),
                move_concurrency,
            },
        )
    }

    /// Mock engine answering by exact FEN, `fallback` everywhere else.
    fn scripted(replies: HashMap<String, MockReply>, fallback: MockReply) -> MockEngineFactory {
        MockEngineFactory::new(move |board, _| {
            Ok(replies
                .get(&format_fen(board))
                .cloned()
                .unwrap_or_else(|| fallback.clone()))
        })
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn game(start: Option<&str>, tokens: &[&str]) -> Replay {
        let game = replay(start, tokens).unwrap();
        assert!(!game.is_truncated());
        game
    }

    #[tokio::test]
    async fn test_blunder_suggests_better_move_in_san() {
        let game = game(None, &["f3"]);
        let mut replies = HashMap::new();
        replies.insert(STARTING_FEN.to_string(), MockReply::cp(30).best("g1f3"));
        // Black to move, clearly better
        replies.insert(game.moves[0].fen_after.clone(), MockReply::cp(420));

        let analyzer = analyzer(scripted(replies, MockReply::cp(0)), 1);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        let ply = &analyses[0];
        assert_eq!(ply.cp_loss, Some(450));
        assert_eq!(ply.classification, Some(MoveClassification::Blunder));
        assert!(!ply.brilliant);
        assert_eq!(ply.best_move_san.as_deref(), Some("Nf3"));
        assert_eq!(ply.best_move_uci.as_deref(), Some("g1f3"));
        assert_eq!(ply.eval_before, Some(30));
        assert_eq!(ply.eval_after, Some(-420));
    }

    #[tokio::test]
    async fn test_best_move_in_lost_position_has_no_suggestion() {
        let game = game(None, &["e4"]);
        let mut replies = HashMap::new();
        replies.insert(STARTING_FEN.to_string(), MockReply::cp(-300).best("e2e4"));
        replies.insert(game.moves[0].fen_after.clone(), MockReply::cp(800));

        let analyzer = analyzer(scripted(replies, MockReply::cp(0)), 1);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        assert_eq!(analyses[0].classification, Some(MoveClassification::Blunder));
        assert_eq!(analyses[0].best_move_san, None);
        assert_eq!(analyses[0].best_move_uci, None);
    }

    #[tokio::test]
    async fn test_queen_sacrifice_on_move_twenty_is_brilliant() {
        let mut tokens = Vec::new();
        for i in 0..19 {
            tokens.push(if i % 2 == 0 { "Kb1" } else { "Ka1" });
            tokens.push(if i % 2 == 0 { "Re8" } else { "Rd8" });
        }
        tokens.extend(["Qg8+", "Rxg8", "Nf7#"]);
        let game = game(Some("3r3k/6pp/7N/3Q4/8/8/PP6/K7 w - - 0 1"), &tokens);
        assert_eq!(game.moves.len(), 41);

        let sacrifice = &game.moves[38];
        assert_eq!(sacrifice.san, "Qg8+");
        let recapture = &game.moves[39];
        let mut replies = HashMap::new();
        replies.insert(sacrifice.fen_before.clone(), MockReply::mate(2).best("d5g8"));
        replies.insert(
            sacrifice.fen_after.clone(),
            MockReply::mate(-1).best("e8g8").pv(&["e8g8", "h6f7"]),
        );
        replies.insert(recapture.fen_after.clone(), MockReply::mate(1).best("h6f7"));

        let analyzer = analyzer(scripted(replies, MockReply::cp(0)), 4);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        let ply = &analyses[38];
        assert_eq!(ply.ply, 39);
        assert_eq!(ply.move_number, 20);
        assert!(ply.brilliant);
        assert!(ply.classification.is_some_and(|c| c.is_top_move()));
        assert_eq!(ply.best_move_san, None);

        let mate = &analyses[40];
        assert_eq!(mate.eval_after, Some(MATE_CP));
        assert_eq!(mate.cp_loss, Some(0));
        assert!(!mate.brilliant);
        assert_eq!(analyses.iter().filter(|a| a.brilliant).count(), 1);
    }

    #[tokio::test]
    async fn test_checkmate_is_scored_without_engine() {
        let game = game(None, &["f3", "e5", "g4", "Qh4#"]);
        let factory = MockEngineFactory::constant(AnalysisScore::Centipawns(0));
        let analyzer = analyzer(factory.clone(), 2);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        // Four positions before a move, three after (the mate is not searched)
        assert_eq!(factory.calls(), 7);
        assert_eq!(analyses[3].eval_after, Some(MATE_CP));
        assert_eq!(analyses[3].cp_loss, Some(0));
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_only_affected_plies_unanalyzed() {
        let game = game(None, &["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        let broken = game.moves[1].fen_after.clone();
        let factory = MockEngineFactory::new(move |board, _| {
            if format_fen(board) == broken {
                Err(EngineError::Unavailable("engine crashed".into()))
            } else {
                Ok(MockReply::cp(20))
            }
        });

        let analyzer = analyzer(factory, 2);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        assert_eq!(analyses.len(), 5);
        let unanalyzed: Vec<u32> = analyses
            .iter()
            .filter(|a| !a.is_analyzed())
            .map(|a| a.ply)
            .collect();
        assert_eq!(unanalyzed, vec![2, 3]);
        assert!(analyses[1].is_retryable());
        assert_eq!(analyses[1].classification, None);
        assert!(analyses[4].is_analyzed());
    }

    #[tokio::test]
    async fn test_engine_timeout_leaves_ply_retryable() {
        let game = game(None, &["d4", "Nf6", "c4", "e6"]);
        let slow = game.moves[2].fen_after.clone();
        let factory = MockEngineFactory::new(move |board, _| {
            if format_fen(board) == slow {
                Err(EngineError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(MockReply::cp(25))
            }
        });

        let analyzer = analyzer(factory, 2);
        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();

        let unanalyzed: Vec<u32> = analyses
            .iter()
            .filter(|a| !a.is_analyzed())
            .map(|a| a.ply)
            .collect();
        assert_eq!(unanalyzed, vec![3, 4]);
        for ply in &analyses[2..] {
            assert!(matches!(
                ply.status,
                AnalysisStatus::Unanalyzed { retryable: true, .. }
            ));
            assert_eq!(ply.cp_loss, None);
        }
        assert!(analyses[..2].iter().all(|a| a.is_analyzed() && !a.partial));
    }

    #[tokio::test]
    async fn test_search_cut_short_by_budget_is_partial() {
        let game = game(None, &["e4", "e5"]);
        let factory = MockEngineFactory::constant(AnalysisScore::Centipawns(10))
            .with_delay(Duration::from_millis(200));
        let analyzer = MoveAnalyzer::new(
            EnginePool::new(factory, pool_config()),
            AnalyzerConfig {
                depth_policy: DepthPolicy::fixed(12),
                time_budget: Duration::from_millis(10),
                move_concurrency: 1,
            },
        );

        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();
        assert!(analyses.iter().all(|a| a.is_analyzed()));
        assert!(analyses.iter().all(|a| a.partial));
        assert_eq!(analyses[0].cp_loss, Some(0));
    }

    #[tokio::test]
    async fn test_retry_fills_in_transient_failures() {
        let game = game(None, &["d4", "d5", "c4"]);
        // Three failures exhaust the pool's retries for the first evaluation
        let factory = MockEngineFactory::constant(AnalysisScore::Centipawns(10)).failing_evaluations(3);
        let analyzer = analyzer(factory, 1);
        let cancel = no_cancel();

        let first = analyzer.analyze_game("g1", &game.moves, &cancel).await.unwrap();
        assert_eq!(first.iter().filter(|a| !a.is_analyzed()).count(), 1);

        let retried = analyzer
            .retry_unanalyzed("g1", &game.moves, first, &cancel)
            .await
            .unwrap();
        assert!(retried.iter().all(|a| a.is_analyzed()));
        let plies: Vec<u32> = retried.iter().map(|a| a.ply).collect();
        assert_eq!(plies, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_results_are_in_ply_order_with_bounded_concurrency() {
        let tokens = ["e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4", "Nf6", "Nc3", "a6"];
        let game = game(None, &tokens);
        let factory = MockEngineFactory::constant(AnalysisScore::Centipawns(15))
            .with_delay(Duration::from_millis(5));
        let analyzer = analyzer(factory.clone(), 3);

        let analyses = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();
        let plies: Vec<u32> = analyses.iter().map(|a| a.ply).collect();
        assert_eq!(plies, (1..=10).collect::<Vec<_>>());
        // Pool size caps evaluations in flight
        assert!(factory.peak_concurrent() <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_game_returns_error() {
        let game = game(None, &["e4", "e5"]);
        let analyzer = analyzer(MockEngineFactory::constant(AnalysisScore::Centipawns(0)), 1);
        let cancel = Arc::new(AtomicBool::new(true));
        let result = analyzer.analyze_game("g1", &game.moves, &cancel).await;
        assert_eq!(result, Err(AnalysisError::Cancelled));
    }

    #[tokio::test]
    async fn test_reanalysis_is_identical() {
        let game = game(None, &["e4", "e5", "Nf3", "Nc6", "Bc4", "Nd4", "Nxe5", "Qg5"]);
        let factory = MockEngineFactory::new(|board, depth| {
            let spread = board.occupied().len() as i32 * 7 - depth as i32;
            Ok(MockReply::cp(spread))
        });
        let analyzer = analyzer(factory, 3);
        let first = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();
        let second = analyzer.analyze_game("g1", &game.moves, &no_cancel()).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_centipawn_loss_rules() {
        use AnalysisScore::{Centipawns, Mate};
        assert_eq!(centipawn_loss(Centipawns(50), Centipawns(80), false), 0);
        assert_eq!(centipawn_loss(Centipawns(50), Centipawns(-30), false), 80);
        assert_eq!(centipawn_loss(Mate(2), Mate(5), false), 0);
        assert_eq!(centipawn_loss(Mate(-4), Mate(-1), false), 0);
        assert_eq!(centipawn_loss(Mate(3), Centipawns(200), false), MAX_CP_LOSS);
        assert_eq!(centipawn_loss(Centipawns(0), Mate(-2), false), MAX_CP_LOSS);
        assert_eq!(centipawn_loss(Centipawns(10), Mate(0), true), 0);
    }

    #[test]
    fn test_validate_rejects_suggesting_played_move() {
        let game = game(None, &["e4"]);
        let features = extract_features(&game.moves).remove(0);
        let mut analysis = MoveAnalysis::unanalyzed(
            &game.moves[0],
            features,
            &EngineError::Unavailable("x".into()),
        );
        assert!(analysis.validate().is_ok());

        analysis.status = AnalysisStatus::Analyzed;
        analysis.cp_loss = Some(300);
        analysis.classification = Some(MoveClassification::Mistake);
        analysis.best_move_san = Some("e4".into());
        assert!(matches!(
            analysis.validate(),
            Err(AnalysisError::ClassificationInvariantViolation { ply: 1, .. })
        ));

        analysis.best_move_san = Some("d4".into());
        assert!(analysis.validate().is_ok());
        analysis.classification = Some(MoveClassification::Good);
        assert!(analysis.validate().is_err());
    }

    /// Random legal walk from the starting position; `picks` choose moves.
    fn random_walk(picks: &[usize]) -> Replay {
        let mut board = cozy_chess::Board::default();
        let mut tokens = Vec::new();
        for &pick in picks {
            let mut legal = Vec::new();
            board.generate_moves(|moves| {
                legal.extend(moves);
                false
            });
            if legal.is_empty() {
                break;
            }
            let mv = legal[pick % legal.len()];
            tokens.push(chess::format_uci_move_on(&board, mv));
            board.play_unchecked(mv);
        }
        replay(None, &tokens).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_suggestion_never_repeats_played_move(
            picks in proptest::collection::vec(0usize..64, 1..16),
            scores in proptest::collection::vec(-1500i32..1500, 17),
            same in proptest::collection::vec(any::<bool>(), 16),
        ) {
            let game = random_walk(&picks);
            let mut replies = HashMap::new();
            for (i, played) in game.moves.iter().enumerate() {
                let mut alternatives = Vec::new();
                played.board_before.generate_moves(|moves| {
                    alternatives.extend(moves);
                    false
                });
                let best = if same[i] {
                    played.uci.clone()
                } else {
                    alternatives
                        .iter()
                        .map(|&mv| chess::format_uci_move_on(&played.board_before, mv))
                        .find(|uci| *uci != played.uci)
                        .unwrap_or_else(|| played.uci.clone())
                };
                replies.insert(played.fen_before.clone(), MockReply::cp(scores[i]).best(&best));
            }
            if let Some(last) = game.moves.last() {
                replies.insert(last.fen_after.clone(), MockReply::cp(scores[game.moves.len()]));
            }

            let analyzer = analyzer(scripted(replies, MockReply::cp(0)), 3);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let analyses = runtime
                .block_on(analyzer.analyze_game("fuzz", &game.moves, &no_cancel()))
                .unwrap();

            for (i, analysis) in analyses.iter().enumerate() {
                prop_assert!(analysis.validate().is_ok());
                if same[i] {
                    prop_assert_eq!(&analysis.best_move_san, &None);
                }
                if let Some(best) = &analysis.best_move_san {
                    prop_assert_ne!(best, &analysis.played_san);
                }
                let loss = analysis.cp_loss.unwrap_or(0);
                prop_assert_eq!(
                    analysis.classification,
                    Some(MoveClassification::from_cp_loss(loss))
                );
            }
        }
    }
}
