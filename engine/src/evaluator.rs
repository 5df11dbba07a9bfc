//! The position evaluator seam.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! evaluations can run inside `tokio::spawn`ed workers.

use std::future::Future;
use std::time::Duration;

use chess::{format_san, format_uci_move, format_uci_move_on, parse_uci_move, AnalysisScore, PieceColor};
use cozy_chess::{Board, Color, Move};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// An engine move in both notations. Only `san` is meant for people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedMove {
    pub uci: String,
    pub san: String,
}

/// Result of evaluating one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvaluation {
    /// From White's point of view.
    pub score: AnalysisScore,
    pub best_move: Option<SuggestedMove>,
    /// Principal variation in UCI, legal from the evaluated position.
    pub pv: Vec<String>,
    pub depth: u8,
    /// The search was cut short by the time budget.
    pub partial: bool,
}

impl EngineEvaluation {
    /// Build an evaluation from raw engine output, which scores from the
    /// side to move's point of view and writes castling as e1g1.
    ///
    /// Moves that are not legal in `board` are dropped rather than shown in
    /// coordinate form. The PV is cut at its first illegal move.
    pub fn from_side_to_move(
        board: &Board,
        score: AnalysisScore,
        best: Option<Move>,
        pv: &[Move],
        depth: u8,
        partial: bool,
    ) -> Self {
        let score = match board.side_to_move() {
            Color::White => score,
            Color::Black => score.negate(),
        };

        let mut cursor = board.clone();
        let mut pv_uci = Vec::with_capacity(pv.len());
        for &raw in pv {
            let Some(mv) = resolve(&cursor, raw) else {
                break;
            };
            pv_uci.push(format_uci_move_on(&cursor, mv));
            cursor.play_unchecked(mv);
        }

        let best_move = best
            .or_else(|| pv.first().copied())
            .and_then(|raw| resolve(board, raw))
            .map(|mv| SuggestedMove {
                uci: format_uci_move_on(board, mv),
                san: format_san(board, mv),
            });

        Self {
            score,
            best_move,
            pv: pv_uci,
            depth,
            partial,
        }
    }

    /// Score from `color`'s point of view.
    pub fn score_for(&self, color: PieceColor) -> AnalysisScore {
        match color {
            PieceColor::White => self.score,
            PieceColor::Black => self.score.negate(),
        }
    }
}

fn resolve(board: &Board, raw: Move) -> Option<Move> {
    parse_uci_move(board, &format_uci_move(raw)).ok()
}

/// Anything that can score a position: a UCI engine process or a test double.
pub trait Evaluator: Send {
    /// Evaluate `fen` to `depth`. `time_budget` is a soft cap: if it runs out
    /// the best result so far comes back marked `partial`, and
    /// [`EngineError::Timeout`] is returned only when there is none.
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> impl Future<Output = Result<EngineEvaluation, EngineError>> + Send;

    fn best_move(
        &mut self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> impl Future<Output = Result<SuggestedMove, EngineError>> + Send {
        async move {
            self.evaluate(fen, depth, time_budget)
                .await?
                .best_move
                .ok_or_else(|| EngineError::Protocol(format!("no best move for {fen}")))
        }
    }
}

/// Creates evaluators for the [`crate::EnginePool`].
pub trait EvaluatorFactory: Send + Sync + 'static {
    type Evaluator: Evaluator + 'static;

    fn spawn(&self) -> impl Future<Output = Result<Self::Evaluator, EngineError>> + Send;
}
