//! `chess-review`: batch game review from the command line.
//!
//! `analyze` runs a JSON file of games through the engine and prints the
//! batch report; `profile` builds a player's profile from stored summaries.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::{EnginePool, EvalCache, StockfishFactory};
use review::config::{self, ReviewConfig};
use review::{player_game, BatchOrchestrator, GameInput, JsonSummaryStore, SummaryStore};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chess-review", about = "Engine review of chess games and player profiles")]
struct Cli {
    /// Write logs to daily files in this directory instead of stderr.
    #[arg(long, global = true, env = "REVIEW_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every game in a JSON file and print the batch report.
    Analyze {
        /// JSON array of games (`id`, `moves` or `pgn`, optional `meta`).
        games: PathBuf,
        /// Keep one summary file per game here; defaults to the review data
        /// directory.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Write the report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        game_concurrency: Option<usize>,
        #[arg(long)]
        move_concurrency: Option<usize>,
        #[arg(long)]
        pool_size: Option<usize>,
        /// Search every position to this depth, turning adaptive depth off.
        #[arg(long)]
        depth: Option<u8>,
        #[arg(long)]
        stockfish: Option<PathBuf>,
    },
    /// Build a player profile from stored summaries.
    Profile {
        /// The games file the summaries were produced from.
        games: PathBuf,
        /// Player name as it appears in the game metadata.
        #[arg(long)]
        player: String,
        /// Summary directory; defaults to the review data directory.
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Analyze {
            games,
            store,
            output,
            game_concurrency,
            move_concurrency,
            pool_size,
            depth,
            stockfish,
        } => {
            let mut config = ReviewConfig::from_env();
            if let Some(n) = game_concurrency {
                config.batch.game_concurrency = n.max(1);
            }
            if let Some(n) = move_concurrency {
                config.analyzer.move_concurrency = n.max(1);
            }
            if let Some(n) = pool_size {
                config.pool.max_size = n.max(1);
            }
            if let Some(depth) = depth {
                config.analyzer.depth_policy = analysis::DepthPolicy::fixed(depth);
            }
            if stockfish.is_some() {
                config.stockfish.path = stockfish;
            }

            let games = read_games(&games)?;
            let dir = summary_dir(store);
            analyze(config, games, JsonSummaryStore::new(dir), output.as_deref()).await
        }
        Commands::Profile {
            games,
            player,
            store,
            output,
        } => {
            let dir = summary_dir(store);
            profile(&read_games(&games)?, &player, &JsonSummaryStore::new(dir), output.as_deref()).await
        }
    }
}

/// Stderr with span timings, or daily log files through a non-blocking
/// writer. The returned guard flushes the file writer on drop.
fn init_tracing(
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "chess-review");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(filter)
        .init();
    Ok(Some(guard))
}

/// Both commands default to the same directory, so `profile` finds what
/// `analyze` stored.
fn summary_dir(store: Option<PathBuf>) -> PathBuf {
    store.unwrap_or_else(config::get_data_dir)
}

fn read_games(path: &Path) -> anyhow::Result<Vec<GameInput>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading games from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing games in {}", path.display()))
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn analyze<S: SummaryStore>(
    config: ReviewConfig,
    games: Vec<GameInput>,
    store: S,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    tracing::info!(
        games = games.len(),
        pool_size = config.pool.max_size,
        game_concurrency = config.batch.game_concurrency,
        move_concurrency = config.analyzer.move_concurrency,
        "Starting batch review"
    );

    let factory = StockfishFactory::new(config.stockfish.clone());
    let pool = if config.cache_capacity > 0 {
        EnginePool::with_cache(
            factory,
            config.pool.clone(),
            EvalCache::new(config.cache_capacity, config.cache_ttl),
        )
    } else {
        EnginePool::new(factory, config.pool.clone())
    };
    let analyzer = analysis::MoveAnalyzer::new(pool, config.analyzer.clone());
    let orchestrator = BatchOrchestrator::new(analyzer, store, config.batch.clone());

    let job_id = orchestrator.submit(games).await;
    let mut updates = orchestrator.subscribe(job_id).await?;
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            tracing::info!(job_id = %job_id, ?status, "Batch progress");
        }
    });

    let report = tokio::select! {
        report = orchestrator.wait(job_id) => report?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(job_id = %job_id, "Interrupted, cancelling batch");
            orchestrator.cancel(job_id).await?;
            orchestrator.wait(job_id).await?
        }
    };

    let stats = orchestrator.analyzer().pool().stats();
    tracing::info!(
        spawned = stats.spawned,
        peak_active = stats.peak_active,
        "Engine pool usage"
    );

    write_json(&report, output)?;
    if !report.failures.is_empty() {
        tracing::warn!(failed = report.failures.len(), "Some games could not be reviewed");
    }
    if !report.store_failures.is_empty() {
        tracing::warn!(unstored = report.store_failures.len(), "Some summaries could not be stored");
    }
    Ok(())
}

async fn profile<S: SummaryStore>(
    games: &[GameInput],
    player: &str,
    store: &S,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut loaded = Vec::new();
    for game in games {
        let Some(summary) = store.load_summary(&game.id).await? else {
            tracing::warn!(game_id = %game.id, "No stored summary, skipping");
            continue;
        };
        // Tags in PGN text fill in metadata the games file leaves out
        let meta = game
            .replay()
            .map(|(_, meta)| meta)
            .unwrap_or_else(|_| game.meta.clone());
        loaded.push((summary, meta));
    }

    let player_games: Vec<_> = loaded
        .iter()
        .map(|(summary, meta)| player_game(summary, meta, player))
        .collect();
    let profile = analysis::build_profile(player, &player_games);
    tracing::info!(
        player,
        games = profile.games,
        excluded = profile.games_excluded,
        "Profile built"
    );
    write_json(&profile, output)
}
