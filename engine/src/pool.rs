//! Bounded pool of exclusive-use evaluators with idle eviction.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{EngineError, EngineEvaluation, EvalCache, Evaluator, EvaluatorFactory};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Most evaluators alive at once, busy or idle.
    pub max_size: usize,
    /// Idle evaluators older than this are shut down.
    pub idle_ttl: Duration,
    /// How long `acquire` waits for a free slot before giving up.
    pub acquire_timeout: Duration,
    /// Attempts to start a new evaluator before reporting it unavailable.
    pub spawn_retries: u32,
    /// Base delay between retries; grows linearly with the attempt number.
    pub retry_backoff: Duration,
    /// Extra attempts `EnginePool::evaluate` makes after an unavailable engine.
    pub max_eval_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            idle_ttl: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            spawn_retries: 3,
            retry_backoff: Duration::from_millis(200),
            max_eval_retries: 2,
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub live: usize,
    pub idle: usize,
    pub active: usize,
    /// Highest number of evaluators handed out at the same time.
    pub peak_active: usize,
    pub spawned: usize,
}

pub struct EnginePool<F: EvaluatorFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: EvaluatorFactory> Clone for EnginePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<F: EvaluatorFactory> {
    factory: F,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleEvaluator<F::Evaluator>>>,
    cache: Option<EvalCache>,
    live: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    spawned: AtomicUsize,
}

struct IdleEvaluator<E> {
    evaluator: E,
    idle_since: Instant,
}

impl<F: EvaluatorFactory> EnginePool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self::build(factory, config, None)
    }

    /// A pool whose `evaluate` helper consults `cache` first.
    pub fn with_cache(factory: F, config: PoolConfig, cache: EvalCache) -> Self {
        Self::build(factory, config, Some(cache))
    }

    fn build(factory: F, config: PoolConfig, cache: Option<EvalCache>) -> Self {
        let max_size = config.max_size.max(1);
        let inner = Arc::new(PoolInner {
            factory,
            permits: Arc::new(Semaphore::new(max_size)),
            config: PoolConfig { max_size, ..config },
            idle: Mutex::new(Vec::new()),
            cache,
            live: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(reap_idle(Arc::downgrade(&inner)));
        }

        Self { inner }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> Option<&EvalCache> {
        self.inner.cache.as_ref()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.inner.live.load(Ordering::SeqCst),
            idle: self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0),
            active: self.inner.active.load(Ordering::SeqCst),
            peak_active: self.inner.peak_active.load(Ordering::SeqCst),
            spawned: self.inner.spawned.load(Ordering::SeqCst),
        }
    }

    /// Take an evaluator for exclusive use, reusing an idle one when
    /// possible. Waits up to `acquire_timeout` when the pool is at capacity.
    pub async fn acquire(&self) -> Result<PooledEvaluator<F>, EngineError> {
        let timeout = self.inner.config.acquire_timeout;
        let permit = tokio::time::timeout(timeout, Arc::clone(&self.inner.permits).acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(?timeout, "engine pool exhausted");
                EngineError::PoolExhausted(timeout)
            })?
            .map_err(|_| EngineError::Unavailable("engine pool closed".to_string()))?;

        let evaluator = match self.inner.take_idle() {
            Some(evaluator) => evaluator,
            None => self.inner.spawn_with_retry().await?,
        };

        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_active.fetch_max(active, Ordering::SeqCst);

        Ok(PooledEvaluator {
            evaluator: Some(evaluator),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Evaluate through the cache and a pooled evaluator.
    ///
    /// An evaluator that fails is shut down instead of going back to the
    /// pool; `Unavailable` is retried up to `max_eval_retries` times.
    pub async fn evaluate(
        &self,
        fen: &str,
        depth: u8,
        time_budget: Duration,
    ) -> Result<EngineEvaluation, EngineError> {
        if let Some(hit) = self.inner.cache.as_ref().and_then(|c| c.get(fen, depth)) {
            tracing::trace!(fen, depth, "evaluation cache hit");
            return Ok(hit);
        }

        let mut attempt = 0;
        loop {
            let mut handle = self.acquire().await?;
            match handle.evaluate(fen, depth, time_budget).await {
                Ok(evaluation) => {
                    if let Some(cache) = &self.inner.cache {
                        cache.insert(fen, &evaluation);
                    }
                    return Ok(evaluation);
                }
                Err(err) => {
                    if err.poisons_evaluator() {
                        handle.discard();
                    }
                    drop(handle);

                    if matches!(err, EngineError::Unavailable(_))
                        && attempt < self.inner.config.max_eval_retries
                    {
                        attempt += 1;
                        tracing::warn!(attempt, error = %err, "evaluator failed, retrying");
                        tokio::time::sleep(self.inner.config.retry_backoff * attempt).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Shut down idle evaluators past their TTL. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        self.inner.evict_expired()
    }
}

impl<F: EvaluatorFactory> PoolInner<F> {
    fn take_idle(&self) -> Option<F::Evaluator> {
        self.evict_expired();
        let Ok(mut idle) = self.idle.lock() else {
            return None;
        };
        idle.pop().map(|entry| entry.evaluator)
    }

    fn evict_expired(&self) -> usize {
        let expired: Vec<IdleEvaluator<F::Evaluator>> = {
            let Ok(mut idle) = self.idle.lock() else {
                return 0;
            };
            let ttl = self.config.idle_ttl;
            let (keep, expired): (Vec<_>, Vec<_>) =
                idle.drain(..).partition(|e| e.idle_since.elapsed() < ttl);
            *idle = keep;
            expired
        };

        let count = expired.len();
        if count > 0 {
            self.live.fetch_sub(count, Ordering::SeqCst);
            tracing::info!(count, "evicted idle evaluators");
        }
        count
    }

    async fn spawn_with_retry(&self) -> Result<F::Evaluator, EngineError> {
        let attempts = self.config.spawn_retries.max(1);
        let mut last_err = EngineError::Unavailable("no spawn attempted".to_string());

        for attempt in 1..=attempts {
            match self.factory.spawn().await {
                Ok(evaluator) => {
                    self.live.fetch_add(1, Ordering::SeqCst);
                    self.spawned.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(attempt, "spawned evaluator");
                    return Ok(evaluator);
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts, error = %err, "failed to spawn evaluator");
                    last_err = err;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    fn release(&self, evaluator: F::Evaluator) {
        match self.idle.lock() {
            Ok(mut idle) => idle.push(IdleEvaluator {
                evaluator,
                idle_since: Instant::now(),
            }),
            Err(_) => {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

async fn reap_idle<F: EvaluatorFactory>(pool: Weak<PoolInner<F>>) {
    let period = match pool.upgrade() {
        Some(inner) => (inner.config.idle_ttl / 2).max(Duration::from_secs(1)),
        None => return,
    };
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = pool.upgrade() else {
            break;
        };
        inner.evict_expired();
    }
}

/// Exclusive handle on a pooled evaluator; returned to the pool on drop.
pub struct PooledEvaluator<F: EvaluatorFactory> {
    evaluator: Option<F::Evaluator>,
    pool: Arc<PoolInner<F>>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<F: EvaluatorFactory> PooledEvaluator<F> {
    /// Shut the evaluator down on drop instead of reusing it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<F: EvaluatorFactory> Deref for PooledEvaluator<F> {
    type Target = F::Evaluator;

    fn deref(&self) -> &Self::Target {
        match &self.evaluator {
            Some(evaluator) => evaluator,
            None => unreachable!("evaluator is only taken on drop"),
        }
    }
}

impl<F: EvaluatorFactory> DerefMut for PooledEvaluator<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.evaluator {
            Some(evaluator) => evaluator,
            None => unreachable!("evaluator is only taken on drop"),
        }
    }
}

impl<F: EvaluatorFactory> Drop for PooledEvaluator<F> {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(evaluator) = self.evaluator.take() {
            if self.discard {
                self.pool.live.fetch_sub(1, Ordering::SeqCst);
                drop(evaluator);
            } else {
                self.pool.release(evaluator);
            }
        }
    }
}
