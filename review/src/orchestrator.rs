//! Batch review: fans games out to a fixed set of workers, tracks jobs and
//! honours cancellation.
//!
//! Workers share one job queue; each pulls the next game when it finishes
//! the previous one, so at most `game_concurrency` games are in flight and
//! the engine pool bounds the evaluations underneath them. Cancellation is
//! a flag checked before each game and before each ply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use analysis::{summarize_game, AnalysisError, GameSummary, MoveAnalyzer};
use engine::EvaluatorFactory;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

use crate::config::BatchConfig;
use crate::error::ReviewError;
use crate::store::SummaryStore;
use crate::types::{BatchReport, GameFailure, GameInput, JobId, JobStatus};

struct Job {
    cancel: Arc<AtomicBool>,
    status: watch::Receiver<JobStatus>,
    finished: Arc<OnceLock<FinishedJob>>,
}

struct FinishedJob {
    at: Instant,
    report: BatchReport,
}

struct Inner<F: EvaluatorFactory, S: SummaryStore> {
    analyzer: MoveAnalyzer<F>,
    store: S,
    config: BatchConfig,
    jobs: RwLock<HashMap<JobId, Job>>,
}

/// Runs batches of game reviews. Cheap to clone.
pub struct BatchOrchestrator<F: EvaluatorFactory, S: SummaryStore> {
    inner: Arc<Inner<F, S>>,
}

impl<F: EvaluatorFactory, S: SummaryStore> Clone for BatchOrchestrator<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// What one worker made of one game.
enum GameOutcome {
    /// Analyzed. The failure is set when the summary could not be stored.
    Done(GameSummary, Option<GameFailure>),
    Failed(GameFailure),
    /// Cancelled before or during analysis; nothing was stored.
    Skipped,
}

impl<F: EvaluatorFactory, S: SummaryStore> BatchOrchestrator<F, S> {
    pub fn new(analyzer: MoveAnalyzer<F>, store: S, config: BatchConfig) -> Self {
        let config = BatchConfig {
            game_concurrency: config.game_concurrency.max(1),
            ..config
        };
        tracing::info!(
            game_concurrency = config.game_concurrency,
            retry_attempts = config.retry_attempts,
            job_retention = config.job_retention,
            "Batch orchestrator initialized"
        );
        Self {
            inner: Arc::new(Inner {
                analyzer,
                store,
                config,
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn analyzer(&self) -> &MoveAnalyzer<F> {
        &self.inner.analyzer
    }

    /// Start a batch in the background and return its handle.
    pub async fn submit(&self, games: Vec<GameInput>) -> JobId {
        let job_id = JobId::new();
        let total_games = games.len() as u32;
        let (status_tx, status_rx) = watch::channel(JobStatus::Queued { total_games });
        let cancel = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(OnceLock::new());

        self.prune_finished_jobs().await;
        self.inner.jobs.write().await.insert(
            job_id,
            Job {
                cancel: cancel.clone(),
                status: status_rx,
                finished: finished.clone(),
            },
        );
        tracing::info!(job_id = %job_id, games = total_games, "Batch submitted");

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let report = orchestrator
                .execute(job_id, games, cancel, Some(status_tx.clone()))
                .await;
            let status = final_status(&report, total_games);
            let _ = finished.set(FinishedJob {
                at: Instant::now(),
                report,
            });
            // Waiters hold their own handle, so eviction never loses a report
            orchestrator.prune_finished_jobs().await;
            status_tx.send_replace(status);
        });

        job_id
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatus, ReviewError> {
        let jobs = self.inner.jobs.read().await;
        let job = jobs.get(&job_id).ok_or(ReviewError::UnknownJob(job_id))?;
        let status = job.status.borrow().clone();
        Ok(status)
    }

    /// Status updates for a job, starting with the current one.
    pub async fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<JobStatus>, ReviewError> {
        let jobs = self.inner.jobs.read().await;
        jobs.get(&job_id)
            .map(|job| job.status.clone())
            .ok_or(ReviewError::UnknownJob(job_id))
    }

    /// Ask a job to stop. Games already summarized stay in the report.
    pub async fn cancel(&self, job_id: JobId) -> Result<(), ReviewError> {
        let jobs = self.inner.jobs.read().await;
        let job = jobs.get(&job_id).ok_or(ReviewError::UnknownJob(job_id))?;
        job.cancel.store(true, Ordering::SeqCst);
        tracing::info!(job_id = %job_id, "Batch cancellation requested");
        Ok(())
    }

    /// Wait for a job to finish and return its report.
    ///
    /// Finished jobs are only kept for a while (see
    /// [`BatchConfig::job_retention`] and [`BatchConfig::job_ttl`]); once
    /// evicted, the job is unknown.
    pub async fn wait(&self, job_id: JobId) -> Result<BatchReport, ReviewError> {
        let (mut status, finished) = {
            let jobs = self.inner.jobs.read().await;
            let job = jobs.get(&job_id).ok_or(ReviewError::UnknownJob(job_id))?;
            (job.status.clone(), job.finished.clone())
        };

        // The sender only goes away after the terminal status was sent
        let _ = status.wait_for(JobStatus::is_terminal).await;
        finished
            .get()
            .map(|job| job.report.clone())
            .ok_or(ReviewError::UnknownJob(job_id))
    }

    /// Forget finished jobs past the retention count or older than the TTL.
    /// Running jobs are never evicted.
    async fn prune_finished_jobs(&self) {
        let config = &self.inner.config;
        let mut jobs = self.inner.jobs.write().await;

        let mut finished: Vec<(JobId, Instant)> = jobs
            .iter()
            .filter_map(|(id, job)| job.finished.get().map(|done| (*id, done.at)))
            .collect();
        finished.sort_by(|a, b| b.1.cmp(&a.1));

        let mut evicted = 0usize;
        for (index, (id, at)) in finished.into_iter().enumerate() {
            if index >= config.job_retention || at.elapsed() >= config.job_ttl {
                jobs.remove(&id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, retained = jobs.len(), "Evicted finished jobs");
        }
    }

    /// Run a batch to completion on the caller's task.
    pub async fn run_batch(&self, games: Vec<GameInput>, cancel: Arc<AtomicBool>) -> BatchReport {
        self.execute(JobId::new(), games, cancel, None).await
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id, games = games.len()))]
    async fn execute(
        &self,
        job_id: JobId,
        games: Vec<GameInput>,
        cancel: Arc<AtomicBool>,
        progress: Option<watch::Sender<JobStatus>>,
    ) -> BatchReport {
        let started = Instant::now();
        let total_games = games.len() as u32;
        if let Some(progress) = &progress {
            progress.send_replace(JobStatus::Running {
                completed_games: 0,
                total_games,
            });
        }

        let (job_tx, job_rx) = mpsc::channel::<(usize, GameInput)>(games.len().max(1));
        for job in games.into_iter().enumerate() {
            // Capacity covers every game, so this never waits
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        // Each worker calls rx.lock().await.recv().await, so only one
        // worker picks up each game.
        let shared_rx = Arc::new(Mutex::new(job_rx));
        let workers = self.inner.config.game_concurrency.min(total_games.max(1) as usize);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let orchestrator = self.clone();
            let rx = shared_rx.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .run_worker(worker_id, rx, cancel, progress, total_games)
                    .await
            }));
        }

        let mut outcomes: Vec<(usize, GameOutcome)> = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(done) => outcomes.extend(done),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::error!("Review worker aborted: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = BatchReport {
            job_id,
            summaries: Vec::new(),
            failures: Vec::new(),
            store_failures: Vec::new(),
            cancelled: cancel.load(Ordering::SeqCst),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        for (_, outcome) in outcomes {
            match outcome {
                GameOutcome::Done(summary, store_failure) => {
                    report.summaries.push(summary);
                    report.store_failures.extend(store_failure);
                }
                GameOutcome::Failed(failure) => report.failures.push(failure),
                GameOutcome::Skipped => {}
            }
        }

        tracing::info!(
            completed = report.summaries.len(),
            failed = report.failures.len(),
            unstored = report.store_failures.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "Batch finished"
        );
        report
    }

    /// A long-lived worker. Takes games from the shared queue one at a time
    /// until it is empty or the batch is cancelled.
    async fn run_worker(
        &self,
        worker_id: usize,
        job_rx: Arc<Mutex<mpsc::Receiver<(usize, GameInput)>>>,
        cancel: Arc<AtomicBool>,
        progress: Option<watch::Sender<JobStatus>>,
        total_games: u32,
    ) -> Vec<(usize, GameOutcome)> {
        tracing::debug!(worker_id, "Review worker started");
        let mut outcomes = Vec::new();

        loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(worker_id, "Batch cancelled, worker exiting");
                break;
            }
            let next = {
                let mut rx = job_rx.lock().await;
                rx.recv().await
            };
            let Some((index, game)) = next else {
                tracing::debug!(worker_id, "Job queue drained, worker exiting");
                break;
            };

            let outcome = match self.review_game(worker_id, &game, &cancel).await {
                Ok(summary) => {
                    // A store failure loses nothing analyzed; it is reported
                    // next to the summary instead
                    let store_failure = match self.inner.store.save_summary(&summary).await {
                        Ok(()) => None,
                        Err(e) => {
                            tracing::error!(worker_id, game_id = %game.id, "Failed to store summary: {}", e);
                            Some(GameFailure {
                                game_id: game.id.clone(),
                                error: e.to_string(),
                            })
                        }
                    };
                    GameOutcome::Done(summary, store_failure)
                }
                Err(ReviewError::Analysis(AnalysisError::Cancelled)) => {
                    tracing::info!(worker_id, game_id = %game.id, "Game analysis cancelled");
                    GameOutcome::Skipped
                }
                Err(e) => {
                    tracing::error!(worker_id, game_id = %game.id, "Game review failed: {}", e);
                    GameOutcome::Failed(GameFailure {
                        game_id: game.id.clone(),
                        error: e.to_string(),
                    })
                }
            };

            if let (Some(progress), GameOutcome::Done(..)) = (&progress, &outcome) {
                progress.send_modify(|status| {
                    if let JobStatus::Running {
                        completed_games, ..
                    } = status
                    {
                        *completed_games += 1;
                    } else {
                        *status = JobStatus::Running {
                            completed_games: 1,
                            total_games,
                        };
                    }
                });
            }
            outcomes.push((index, outcome));
        }

        outcomes
    }

    /// Replay, analyze, retry transient failures and summarize one game.
    async fn review_game(
        &self,
        worker_id: usize,
        game: &GameInput,
        cancel: &Arc<AtomicBool>,
    ) -> Result<GameSummary, ReviewError> {
        let (replayed, _) = game.replay()?;
        if let Some(truncation) = &replayed.truncated {
            tracing::warn!(
                worker_id,
                game_id = %game.id,
                ply = truncation.ply,
                token = %truncation.token,
                reason = %truncation.reason,
                "Malformed game, analyzing the valid prefix"
            );
        }
        tracing::info!(worker_id, game_id = %game.id, plies = replayed.moves.len(), "Starting game review");

        let analyzer = &self.inner.analyzer;
        let mut analyses = analyzer.analyze_game(&game.id, &replayed.moves, cancel).await?;

        for attempt in 1..=self.inner.config.retry_attempts {
            let pending = analyses.iter().filter(|a| a.is_retryable()).count();
            if pending == 0 {
                break;
            }
            tracing::warn!(worker_id, game_id = %game.id, attempt, pending, "Retrying unanalyzed plies");
            tokio::time::sleep(self.inner.config.retry_backoff * attempt).await;
            analyses = analyzer
                .retry_unanalyzed(&game.id, &replayed.moves, analyses, cancel)
                .await?;
        }

        let summary = summarize_game(game.id.clone(), analyses, replayed.truncated);

        tracing::info!(
            worker_id,
            game_id = %game.id,
            white_accuracy = ?summary.white.accuracy,
            black_accuracy = ?summary.black.accuracy,
            unanalyzed = summary.overall.counts.unanalyzed,
            "Game review complete"
        );
        Ok(summary)
    }
}

fn final_status(report: &BatchReport, total_games: u32) -> JobStatus {
    let completed_games = report.summaries.len() as u32;
    if report.cancelled {
        JobStatus::Cancelled {
            completed_games,
            total_games,
        }
    } else {
        JobStatus::Completed {
            completed_games,
            failed_games: report.failures.len() as u32,
        }
    }
}
