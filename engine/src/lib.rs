pub mod cache;
pub mod error;
pub mod evaluator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pool;
pub mod stockfish;
pub mod uci;

pub use cache::EvalCache;
pub use error::EngineError;
pub use evaluator::{EngineEvaluation, Evaluator, EvaluatorFactory, SuggestedMove};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockEngineFactory, MockEvaluator, MockReply};
pub use pool::{EnginePool, PoolConfig, PoolStats, PooledEvaluator};
pub use stockfish::{StockfishConfig, StockfishEngine, StockfishFactory};
pub use uci::{UciError, UciMessage};

use chess::AnalysisScore;
use cozy_chess::Move;

/// Commands sent to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    SetPosition { fen: String, moves: Vec<Move> },
    SetOption { name: String, value: Option<String> },
    NewGame,
    IsReady,
    Go(GoParams),
    Stop,
}

/// Parameters for the "go" command
#[derive(Debug, Clone, Default)]
pub struct GoParams {
    pub depth: Option<u8>,
}

/// Events received from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ready,
    /// `None` when the engine answered `bestmove (none)`.
    BestMove(Option<Move>),
    Info(EngineInfo),
    Error(String),
}

/// Engine analysis information
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    /// Side-to-move perspective, as reported over UCI.
    pub score: Option<AnalysisScore>,
    /// Raw principal variation; castling is in UCI form (e1g1).
    pub pv: Vec<Move>,
    pub multipv: Option<u8>,
    pub currmove: Option<Move>,
    pub hashfull: Option<u16>,
    pub nps: Option<u64>,
    /// Set for `lowerbound`/`upperbound` scores, which are not exact.
    pub bound: bool,
}
