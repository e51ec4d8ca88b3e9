//! Bounded LRU memoization for network reads, with in-flight request coalescing

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Recorded failure of an underlying fetch; cached like a value
#[derive(Error, Debug, Clone, PartialEq)]
#[error("fetch failed: {0}")]
pub struct FetchFailed(pub String);

pub type Fetched<V> = Result<V, FetchFailed>;

type PendingFetch<V> = Shared<BoxFuture<'static, Fetched<V>>>;

struct CacheState<K, V> {
    /// `None` when the cache was built with zero capacity
    entries: Option<LruCache<K, Fetched<V>>>,
    pending: HashMap<K, PendingFetch<V>>,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

/// Memoizes `key -> value or failure` for up to `capacity` keys.
///
/// Concurrent lookups of a key that is being fetched share one underlying
/// future. The state lock is never held across an await point, so inserts
/// and evictions are serialized with lookups.
pub struct QueryCache<K, V> {
    name: &'static str,
    state: Mutex<CacheState<K, V>>,
    metrics: CacheMetrics,
}

impl<K, V> QueryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            state: Mutex::new(CacheState {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                pending: HashMap::new(),
            }),
            metrics: CacheMetrics::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached result for `key`, joining an in-flight fetch or
    /// starting one with `fetch` on a miss.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Fetched<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Fetched<V>> + Send + 'static,
    {
        let pending = {
            let mut state = self.lock();
            if let Some(value) = state.entries.as_mut().and_then(|entries| entries.get(&key)) {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return value.clone();
            }
            match state.pending.get(&key) {
                Some(in_flight) => {
                    self.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
                    in_flight.clone()
                }
                None => {
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    state.pending.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let value = pending.clone().await;

        let mut state = self.lock();
        let owns_pending = state
            .pending
            .get(&key)
            .map(|in_flight| in_flight.ptr_eq(&pending))
            .unwrap_or(false);
        if owns_pending {
            state.pending.remove(&key);
            self.insert_locked(&mut state, key, value.clone());
        }
        value
    }

    fn insert_locked(&self, state: &mut CacheState<K, V>, key: K, value: Fetched<V>) {
        let Some(entries) = state.entries.as_mut() else {
            return;
        };
        if let Some((evicted, _)) = entries.push(key.clone(), value) {
            if evicted != key {
                self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("{} cache evicted least recently used entry", self.name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.as_ref().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            coalesced: self.metrics.coalesced.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "{} cache: {} entries, {} hits, {} misses, {} coalesced, {} evictions",
            self.name,
            self.len(),
            stats.hits,
            stats.misses,
            stats.coalesced,
            stats.evictions
        );
    }
}
