//! Scripted in-process evaluator for tests - only compiled in test mode or
//! with the `mock` feature.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess::{parse_fen, AnalysisScore};
use cozy_chess::Board;

use crate::uci::parse_uci_move;
use crate::{EngineError, EngineEvaluation, Evaluator, EvaluatorFactory};

/// What the scripted engine answers for one position. Scores are from the
/// side to move's point of view and moves are UCI, as a real engine reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReply {
    pub score: AnalysisScore,
    pub best: Option<String>,
    pub pv: Vec<String>,
}

impl MockReply {
    pub fn cp(cp: i32) -> Self {
        Self {
            score: AnalysisScore::Centipawns(cp),
            best: None,
            pv: Vec::new(),
        }
    }

    pub fn mate(moves: i32) -> Self {
        Self {
            score: AnalysisScore::Mate(moves),
            best: None,
            pv: Vec::new(),
        }
    }

    pub fn best(mut self, uci: &str) -> Self {
        self.best = Some(uci.to_string());
        self
    }

    pub fn pv(mut self, moves: &[&str]) -> Self {
        self.pv = moves.iter().map(|m| m.to_string()).collect();
        self
    }
}

type Script = dyn Fn(&Board, u8) -> Result<MockReply, EngineError> + Send + Sync;

#[derive(Default)]
struct MockState {
    spawn_failures: AtomicUsize,
    eval_failures: AtomicUsize,
    calls: AtomicUsize,
    spawned: AtomicUsize,
    concurrent: AtomicUsize,
    peak_concurrent: AtomicUsize,
}

/// Factory for [`MockEvaluator`]s sharing one script and one set of counters.
#[derive(Clone)]
pub struct MockEngineFactory {
    script: Arc<Script>,
    delay: Duration,
    state: Arc<MockState>,
}

impl MockEngineFactory {
    pub fn new<S>(script: S) -> Self
    where
        S: Fn(&Board, u8) -> Result<MockReply, EngineError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            state: Arc::new(MockState::default()),
        }
    }

    /// Every position scores `score` for the side to move.
    pub fn constant(score: AnalysisScore) -> Self {
        Self::new(move |_, _| {
            Ok(MockReply {
                score,
                best: None,
                pv: Vec::new(),
            })
        })
    }

    /// Simulated thinking time per evaluation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next `n` spawns fail with `Unavailable`.
    pub fn failing_spawns(self, n: usize) -> Self {
        self.state.spawn_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` evaluations fail with `Unavailable`.
    pub fn failing_evaluations(self, n: usize) -> Self {
        self.state.eval_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.state.spawned.load(Ordering::SeqCst)
    }

    /// Most evaluations that were in flight at the same moment.
    pub fn peak_concurrent(&self) -> usize {
        self.state.peak_concurrent.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl EvaluatorFactory for MockEngineFactory {
    type Evaluator = MockEvaluator;

    fn spawn(&self) -> impl Future<Output = Result<MockEvaluator, EngineError>> + Send {
        let factory = self.clone();
        async move {
            if take_one(&factory.state.spawn_failures) {
                return Err(EngineError::Unavailable("scripted spawn failure".to_string()));
            }
            factory.state.spawned.fetch_add(1, Ordering::SeqCst);
            Ok(MockEvaluator { factory })
        }
    }
}

pub struct MockEvaluator {
    factory: MockEngineFactory,
}

struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_concurrent.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.concurrent.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Evaluator for MockEvaluator {
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> impl Future<Output = Result<EngineEvaluation, EngineError>> + Send {
        let factory = self.factory.clone();
        let fen = fen.to_string();
        async move {
            let state = &factory.state;
            state.calls.fetch_add(1, Ordering::SeqCst);
            let _in_flight = InFlight::enter(state);

            if take_one(&state.eval_failures) {
                return Err(EngineError::Unavailable("scripted engine crash".to_string()));
            }

            let partial = factory.delay > time_budget;
            if !factory.delay.is_zero() {
                tokio::time::sleep(factory.delay.min(time_budget)).await;
            }

            let board = parse_fen(&fen).map_err(|e| EngineError::InvalidPosition(e.to_string()))?;
            let reply = (factory.script)(&board, depth)?;
            let best = match reply.best.as_deref() {
                Some(uci) => Some(
                    parse_uci_move(uci).map_err(|e| EngineError::Protocol(e.to_string()))?,
                ),
                None => None,
            };
            let pv: Vec<_> = reply
                .pv
                .iter()
                .filter_map(|m| parse_uci_move(m).ok())
                .collect();

            Ok(EngineEvaluation::from_side_to_move(
                &board,
                reply.score,
                best,
                &pv,
                depth,
                partial,
            ))
        }
    }
}
