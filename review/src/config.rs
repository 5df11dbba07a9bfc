//! Configuration for batch review
//!
//! Every knob has a compiled-in default and a dedicated environment
//! variable. A variable that is unset or does not parse leaves the default
//! in place. Command-line flags are applied on top by the binary.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use analysis::{AnalyzerConfig, DepthPolicy};
use engine::{PoolConfig, StockfishConfig};

const DEFAULT_CONFIG_DIR: &str = ".config/chess-review/summaries";
const DEV_DATA_DIR: &str = "./data";

pub const DEFAULT_GAME_CONCURRENCY: usize = 2;
pub const DEFAULT_MOVE_CONCURRENCY: usize = 2;
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_ENGINE_IDLE_TTL_SECS: u64 = 300;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TIME_BUDGET_MS: u64 = 5_000;
pub const DEFAULT_STANDARD_DEPTH: u8 = 14;
pub const DEFAULT_REDUCED_DEPTH: u8 = 10;
pub const DEFAULT_DEEP_DEPTH: u8 = 16;
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_JOB_RETENTION: usize = 32;
pub const DEFAULT_JOB_TTL_SECS: u64 = 3_600;
pub const DEFAULT_STOCKFISH_THREADS: u32 = 1;
pub const DEFAULT_STOCKFISH_HASH_MB: u32 = 64;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
                default
            }
        },
        Err(_) => default,
    }
}

/// Get the directory game summaries are stored in.
///
/// Priority:
/// 1. REVIEW_DATA_DIR env variable if set
/// 2. $HOME/.config/chess-review/summaries if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REVIEW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Games analyzed at the same time.
pub fn get_game_concurrency() -> usize {
    env_or("REVIEW_GAME_CONCURRENCY", DEFAULT_GAME_CONCURRENCY).max(1)
}

/// Plies of one game evaluated at the same time.
pub fn get_move_concurrency() -> usize {
    env_or("REVIEW_MOVE_CONCURRENCY", DEFAULT_MOVE_CONCURRENCY).max(1)
}

/// Most engine processes alive at once.
pub fn get_pool_size() -> usize {
    env_or("REVIEW_POOL_SIZE", DEFAULT_POOL_SIZE).max(1)
}

pub fn get_engine_idle_ttl() -> Duration {
    Duration::from_secs(env_or("REVIEW_ENGINE_IDLE_TTL_SECS", DEFAULT_ENGINE_IDLE_TTL_SECS))
}

pub fn get_acquire_timeout() -> Duration {
    Duration::from_secs(env_or("REVIEW_ACQUIRE_TIMEOUT_SECS", DEFAULT_ACQUIRE_TIMEOUT_SECS))
}

/// Soft time cap per evaluation.
pub fn get_time_budget() -> Duration {
    Duration::from_millis(env_or("REVIEW_TIME_BUDGET_MS", DEFAULT_TIME_BUDGET_MS))
}

pub fn get_depth_policy() -> DepthPolicy {
    DepthPolicy {
        reduced: env_or("REVIEW_REDUCED_DEPTH", DEFAULT_REDUCED_DEPTH),
        standard: env_or("REVIEW_STANDARD_DEPTH", DEFAULT_STANDARD_DEPTH),
        deep: env_or("REVIEW_DEEP_DEPTH", DEFAULT_DEEP_DEPTH),
        adaptive: env_or("REVIEW_ADAPTIVE_DEPTH", true),
    }
}

/// Entries in the evaluation cache; 0 disables it.
pub fn get_cache_capacity() -> usize {
    env_or("REVIEW_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)
}

pub fn get_cache_ttl() -> Duration {
    Duration::from_secs(env_or("REVIEW_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS))
}

/// Extra passes over plies whose evaluation failed for a transient reason.
pub fn get_retry_attempts() -> u32 {
    env_or("REVIEW_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)
}

/// Finished jobs kept for `status`/`wait`, newest first.
pub fn get_job_retention() -> usize {
    env_or("REVIEW_JOB_RETENTION", DEFAULT_JOB_RETENTION)
}

pub fn get_job_ttl() -> Duration {
    Duration::from_secs(env_or("REVIEW_JOB_TTL_SECS", DEFAULT_JOB_TTL_SECS))
}

pub fn get_stockfish_config() -> StockfishConfig {
    StockfishConfig {
        path: std::env::var("STOCKFISH_PATH").ok().map(PathBuf::from),
        skill_level: None,
        threads: Some(env_or("STOCKFISH_THREADS", DEFAULT_STOCKFISH_THREADS)),
        hash_mb: Some(env_or("STOCKFISH_HASH_MB", DEFAULT_STOCKFISH_HASH_MB)),
    }
}

/// Batch-level knobs of the orchestrator.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub game_concurrency: usize,
    pub retry_attempts: u32,
    /// Delay before the first retry pass; later passes wait proportionally
    /// longer.
    pub retry_backoff: Duration,
    /// Finished jobs beyond this count are forgotten, oldest first.
    pub job_retention: usize,
    /// Finished jobs older than this are forgotten.
    pub job_ttl: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            game_concurrency: DEFAULT_GAME_CONCURRENCY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            job_retention: DEFAULT_JOB_RETENTION,
            job_ttl: Duration::from_secs(DEFAULT_JOB_TTL_SECS),
        }
    }
}

/// Everything needed to wire up engines, analyzer and orchestrator.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub pool: PoolConfig,
    pub analyzer: AnalyzerConfig,
    pub batch: BatchConfig,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub stockfish: StockfishConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig {
                max_size: DEFAULT_POOL_SIZE,
                ..PoolConfig::default()
            },
            analyzer: AnalyzerConfig::default(),
            batch: BatchConfig::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            stockfish: StockfishConfig {
                threads: Some(DEFAULT_STOCKFISH_THREADS),
                hash_mb: Some(DEFAULT_STOCKFISH_HASH_MB),
                ..StockfishConfig::default()
            },
        }
    }
}

impl ReviewConfig {
    pub fn from_env() -> Self {
        Self {
            pool: PoolConfig {
                max_size: get_pool_size(),
                idle_ttl: get_engine_idle_ttl(),
                acquire_timeout: get_acquire_timeout(),
                ..PoolConfig::default()
            },
            analyzer: AnalyzerConfig {
                depth_policy: get_depth_policy(),
                time_budget: get_time_budget(),
                move_concurrency: get_move_concurrency(),
            },
            batch: BatchConfig {
                game_concurrency: get_game_concurrency(),
                retry_attempts: get_retry_attempts(),
                job_retention: get_job_retention(),
                job_ttl: get_job_ttl(),
                ..BatchConfig::default()
            },
            cache_capacity: get_cache_capacity(),
            cache_ttl: get_cache_ttl(),
            stockfish: get_stockfish_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir_fallback() {
        // Either REVIEW_DATA_DIR, the home config dir or ./data
        let dir = get_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ReviewConfig::default();
        assert_eq!(config.pool.idle_ttl, Duration::from_secs(300));
        assert_eq!(config.analyzer.depth_policy.standard, 14);
        assert_eq!(config.analyzer.depth_policy.reduced, 10);
        assert_eq!(config.analyzer.depth_policy.deep, 16);
        assert!(config.analyzer.depth_policy.adaptive);
        assert_eq!(config.batch.game_concurrency, DEFAULT_GAME_CONCURRENCY);
        assert_eq!(config.batch.job_retention, DEFAULT_JOB_RETENTION);
        assert_eq!(config.batch.job_ttl, Duration::from_secs(3_600));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        // Variable names unique to this test to avoid pollution
        std::env::set_var("REVIEW_TEST_GARBAGE", "not a number");
        assert_eq!(env_or("REVIEW_TEST_GARBAGE", 7usize), 7);
        std::env::set_var("REVIEW_TEST_VALID", " 12 ");
        assert_eq!(env_or("REVIEW_TEST_VALID", 7usize), 12);
        assert_eq!(env_or("REVIEW_TEST_UNSET_VARIABLE", 3u32), 3);
    }
}
