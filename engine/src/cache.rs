use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chess::position_key;
use lru::LruCache;

use crate::EngineEvaluation;

/// Bounded, time-expiring cache of engine evaluations keyed by
/// (position, depth).
///
/// Positions are keyed by the first four FEN fields so transpositions that
/// differ only in move counters share an entry. Partial results are refused.
pub struct EvalCache {
    entries: Mutex<LruCache<(String, u8), CacheEntry>>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    evaluation: EngineEvaluation,
    inserted_at: Instant,
}

impl EvalCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Get a fresh evaluation computed at exactly `depth`.
    pub fn get(&self, fen: &str, depth: u8) -> Option<EngineEvaluation> {
        let key = (position_key(fen), depth);
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let expired = entries.peek(&key)?.inserted_at.elapsed() >= self.ttl;
        if expired {
            entries.pop(&key);
            return None;
        }
        entries.get(&key).map(|entry| entry.evaluation.clone())
    }

    pub fn insert(&self, fen: &str, evaluation: &EngineEvaluation) {
        if evaluation.partial {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                (position_key(fen), evaluation.depth),
                CacheEntry {
                    evaluation: evaluation.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let expired: Vec<(String, u8)> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::AnalysisScore;

    const FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn eval(depth: u8, partial: bool) -> EngineEvaluation {
        EngineEvaluation {
            score: AnalysisScore::Centipawns(30),
            best_move: None,
            pv: vec!["e7e5".into()],
            depth,
            partial,
        }
    }

    #[test]
    fn test_insert_and_get_by_depth() {
        let cache = EvalCache::new(8, Duration::from_secs(60));
        cache.insert(FEN, &eval(10, false));

        assert!(cache.get(FEN, 10).is_some());
        assert!(cache.get(FEN, 14).is_none());
        // Counters are not part of the key
        let later = FEN.replace(" 0 1", " 4 9");
        assert!(cache.get(&later, 10).is_some());
    }

    #[test]
    fn test_partial_results_are_not_cached() {
        let cache = EvalCache::new(8, Duration::from_secs(60));
        cache.insert(FEN, &eval(10, true));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = EvalCache::new(2, Duration::from_secs(60));
        for depth in 1..=5 {
            cache.insert(FEN, &eval(depth, false));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(FEN, 1).is_none());
        assert!(cache.get(FEN, 5).is_some());
    }

    #[test]
    fn test_entries_expire() {
        let cache = EvalCache::new(8, Duration::ZERO);
        cache.insert(FEN, &eval(10, false));
        assert!(cache.get(FEN, 10).is_none());
        assert_eq!(cache.purge_expired(), 0);
        assert!(cache.is_empty());
    }
}
