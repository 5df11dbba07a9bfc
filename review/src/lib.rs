pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use config::{BatchConfig, ReviewConfig};
pub use error::{PersistenceError, ReviewError};
pub use orchestrator::BatchOrchestrator;
pub use store::{JsonSummaryStore, MemorySummaryStore, SummaryStore};
pub use types::{player_game, BatchReport, GameFailure, GameInput, GameMeta, JobId, JobStatus};
