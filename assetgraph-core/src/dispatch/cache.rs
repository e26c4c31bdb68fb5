//! Result Cache
//!
//! Memoizes computation results by canonical request string.
//!
//! # How It Works
//!
//! 1. Each key owns a once-cell. The first caller for a key runs the
//!    computation; concurrent callers for the same key wait on the same cell
//!    instead of computing again.
//!
//! 2. A successful computation fills the cell. Later lookups return the
//!    cached `Arc` without touching the computer.
//!
//! 3. A failed computation leaves the cell empty and removes it, so faults
//!    are never cached.
//!
//! # Eviction
//!
//! Eviction belongs to the caller: `invalidate` and `clear` drop entries
//! explicitly, and an optional capacity evicts the oldest entries first.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use super::request::ComputationResult;

type Slot = Arc<OnceCell<Arc<ComputationResult>>>;

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered without running a computation.
    pub hits: u64,
    /// Lookups that ran a computation.
    pub misses: u64,
}

/// Concurrent map from canonical request string to result.
pub struct ResultCache {
    entries: DashMap<String, Slot>,
    /// Keys in the order their results were stored.
    order: Mutex<VecDeque<String>>,
    capacity: Option<usize>,
    lookups: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create a cache with no capacity bound.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: None,
            lookups: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache holding at most `capacity` results.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Get a cached result without computing.
    pub fn get(&self, key: &str) -> Option<Arc<ComputationResult>> {
        self.entries.get(key).and_then(|slot| slot.value().get().cloned())
    }

    /// Return the cached result for `key`, running `compute` on a miss.
    ///
    /// Errors are passed through and not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: String, compute: F) -> Result<Arc<ComputationResult>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ComputationResult, E>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let slot: Slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(cached) = slot.get() {
            debug!(key_len = key.len(), "result cache hit");
            return Ok(cached.clone());
        }

        let misses = &self.misses;
        let outcome = slot
            .get_or_try_init(move || async move {
                misses.fetch_add(1, Ordering::Relaxed);
                compute().await.map(Arc::new)
            })
            .await
            .cloned();

        match &outcome {
            Ok(_) => self.record(key),
            Err(_) => {
                self.entries.remove_if(&key, |_, slot| !slot.initialized());
            }
        }

        outcome
    }

    /// Store a result. A second store for the same key is a no-op and
    /// returns false.
    pub fn insert(&self, key: String, result: ComputationResult) -> bool {
        let slot: Slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let stored = slot.set(Arc::new(result)).is_ok();
        if stored {
            self.record(key);
        }
        stored
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.order.lock().retain(|k| k != key);
        self.entries.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.order.lock().clear();
        self.entries.clear();
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits: lookups.saturating_sub(misses),
            misses,
        }
    }

    /// Remember insertion order and evict past capacity.
    fn record(&self, key: String) {
        let mut order = self.order.lock();
        if order.iter().any(|k| *k == key) {
            return;
        }
        order.push_back(key);

        if let Some(capacity) = self.capacity {
            while order.len() > capacity {
                if let Some(oldest) = order.pop_front() {
                    self.entries.remove(&oldest);
                    debug!(key_len = oldest.len(), "evicted cached result");
                }
            }
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RequestKind;
    use std::sync::atomic::AtomicI32;

    fn result() -> ComputationResult {
        RequestKind::BuildGraph.empty_result()
    }

    #[tokio::test]
    async fn computes_once_per_key() {
        let cache = ResultCache::new();
        let calls = AtomicI32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute("k".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(result())
                })
                .await
                .unwrap();
            assert!(value.as_graph().is_some());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ResultCache::new();

        let err = cache
            .get_or_compute("k".to_string(), || async { Err::<ComputationResult, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());

        cache
            .get_or_compute("k".to_string(), || async { Ok::<_, &str>(result()) })
            .await
            .unwrap();
        assert!(cache.get("k").is_some());
    }

    #[test]
    fn second_insert_is_a_noop() {
        let cache = ResultCache::new();
        assert!(cache.insert("k".to_string(), result()));
        let first = cache.get("k").unwrap();

        assert!(!cache.insert("k".to_string(), result()));
        assert!(Arc::ptr_eq(&first, &cache.get("k").unwrap()));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = ResultCache::with_capacity(2);
        cache.insert("a".to_string(), result());
        cache.insert("b".to_string(), result());
        cache.insert("c".to_string(), result());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ResultCache::new();
        cache.insert("a".to_string(), result());
        cache.insert("b".to_string(), result());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
