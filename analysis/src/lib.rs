pub mod aggregator;
pub mod brilliant;
pub mod classification;
pub mod depth;
pub mod error;
pub mod features;
pub mod material;
pub mod move_analyzer;
pub mod openings;
pub mod personality;
pub mod player;
pub mod profile;

pub use aggregator::{
    accuracy_from_cp_loss, summarize_game, AccuracyReport, ClassificationCounts, GamePhase,
    GameSummary, PhaseAccuracy, PhaseBoundaries,
};
pub use classification::MoveClassification;
pub use depth::{Complexity, DepthPolicy};
pub use error::AnalysisError;
pub use features::{extract_features, MoveFeatures};
pub use move_analyzer::{
    centipawn_loss, AnalysisStatus, AnalyzerConfig, MoveAnalysis, MoveAnalyzer, MAX_CP_LOSS,
};
pub use openings::{analyze_repertoire, normalize_opening_name, OpeningMistake, OpeningStats};
pub use personality::{score_personality, PersonalityScores};
pub use player::{Outcome, PlayerGame};
pub use profile::{build_profile, PlayerProfile, RatingSummary, TimeControlBucket};
