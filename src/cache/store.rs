//! ValidationCache - memoized validator outcomes
//!
//! Entries are bounded by count, estimated memory and TTL. Concurrent
//! `get_or_compute` calls for the same missing key share one computation:
//! the first caller runs it, later callers wait on a watch channel for its
//! outcome. Failed computations are never stored.
//!
//! Locking: one mutex guards the entries and the global recency order, and
//! a second one guards the in-flight map. Both are held only for map
//! updates, never across a validator call, so a slow computation for one
//! key does not delay lookups of another. Exact global LRU order needs the
//! single entries lock; reads briefly contend with writes to other keys.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::config::CacheConfig;
use crate::cache::key::CacheKey;
use crate::error::Result;
use crate::validation::{ValidationResult, ValidatorError};

type Outcome = std::result::Result<ValidationResult, ValidatorError>;

struct CacheEntry {
    result: ValidationResult,
    size: usize,
    inserted_at: Instant,
    expires_at: Option<Instant>,
    /// Position in the recency order
    tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// tick -> key, oldest access first
    recency: BTreeMap<u64, CacheKey>,
    memory_bytes: usize,
    next_tick: u64,
}

impl CacheState {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.memory_bytes -= entry.size;
        Some(entry)
    }

    fn remove_oldest(&mut self) -> Option<(CacheKey, CacheEntry)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.memory_bytes -= entry.size;
        Some((key, entry))
    }

    fn expired_keys(&self, now: Instant) -> Vec<CacheKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub memory_bytes: usize,
    /// Lookups answered without running the validator
    pub hits: u64,
    /// Lookups that ran the validator
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

enum Flight {
    Hit(ValidationResult),
    Leader(watch::Sender<Option<Outcome>>),
    Follower(watch::Receiver<Option<Outcome>>),
}

/// Removes the in-flight marker when the leading computation ends,
/// including when its future is dropped mid-way
struct FlightGuard<'a> {
    cache: &'a ValidationCache,
    key: &'a CacheKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(&self.cache.inflight).remove(self.key);
    }
}

pub struct ValidationCache {
    config: CacheConfig,
    ttl: Option<Duration>,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<CacheKey, watch::Receiver<Option<Outcome>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ValidationCache {
    /// Create a cache, rejecting unusable bounds
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            config,
            state: Mutex::new(CacheState::default()),
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a key, refreshing its recency
    pub fn get(&self, key: &CacheKey) -> Option<ValidationResult> {
        let found = self.lookup(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn lookup(&self, key: &CacheKey) -> Option<ValidationResult> {
        let now = Instant::now();
        let mut state = lock(&self.state);

        let expired = state.entries.get(key)?.is_expired(now);
        if expired {
            state.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            trace!("cache entry {} expired on access", key);
            return None;
        }

        let tick = state.bump();
        let entry = state.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let result = entry.result.clone();
        state.recency.remove(&old_tick);
        state.recency.insert(tick, key.clone());
        Some(result)
    }

    /// Store a result, evicting least-recently-used entries to stay within
    /// bounds. Returns false when the entry alone exceeds the memory cap.
    pub fn insert(&self, key: CacheKey, result: ValidationResult) -> bool {
        let size = key.as_str().len() + key.content_len() + result.estimated_size();
        if size > self.config.max_memory_bytes {
            debug!(
                "not caching {}: {} bytes exceeds the {} byte cap",
                key, size, self.config.max_memory_bytes
            );
            return false;
        }

        let now = Instant::now();
        let mut state = lock(&self.state);
        state.remove(&key);

        let tick = state.bump();
        state.recency.insert(tick, key.clone());
        state.memory_bytes += size;
        state.entries.insert(
            key,
            CacheEntry {
                result,
                size,
                inserted_at: now,
                expires_at: self.ttl.and_then(|ttl| now.checked_add(ttl)),
                tick,
            },
        );

        if self.over_limits(&state) {
            // Expired entries go before live ones
            for expired in state.expired_keys(now) {
                state.remove(&expired);
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        while self.over_limits(&state) {
            let Some((evicted, entry)) = state.remove_oldest() else {
                break;
            };
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(
                "evicted {} ({} bytes, cached {:?} ago)",
                evicted,
                entry.size,
                now.duration_since(entry.inserted_at)
            );
        }
        true
    }

    fn over_limits(&self, state: &CacheState) -> bool {
        state.entries.len() > self.config.max_entries || state.memory_bytes > self.config.max_memory_bytes
    }

    /// Return the cached result for `key`, or run `compute` once and cache
    /// a successful outcome. Concurrent callers for the same key share a
    /// single computation; a failure reaches every caller sharing it and
    /// leaves the key uncached.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let sender = loop {
            match self.join_flight(key) {
                Flight::Hit(result) => return Ok(result),
                Flight::Leader(sender) => break sender,
                Flight::Follower(receiver) => {
                    if let Some(outcome) = wait_for_leader(receiver).await {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return outcome;
                    }
                    trace!("leader for {} went away, retrying", key);
                }
            }
        };

        let _guard = FlightGuard { cache: self, key };
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("cache miss for {}, computing", key);

        let outcome = compute().await;
        if let Ok(result) = &outcome {
            self.insert(key.clone(), result.clone());
        }
        sender.send_replace(Some(outcome.clone()));
        outcome
    }

    fn join_flight(&self, key: &CacheKey) -> Flight {
        // Lock order: inflight, then state
        let mut inflight = lock(&self.inflight);
        if let Some(result) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("cache hit for {}", key);
            return Flight::Hit(result);
        }
        if let Some(receiver) = inflight.get(key) {
            return Flight::Follower(receiver.clone());
        }
        let (sender, receiver) = watch::channel(None);
        inflight.insert(key.clone(), receiver);
        Flight::Leader(sender)
    }

    /// Whether a live entry exists, without touching its recency
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        lock(&self.state).entries.get(key).is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove one entry
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        lock(&self.state).remove(key).is_some()
    }

    /// Remove every entry; counters are kept
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        let count = state.entries.len();
        *state = CacheState::default();
        debug!("cleared {} cache entries", count);
    }

    /// Remove all expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = lock(&self.state);
        let expired = state.expired_keys(now);
        for key in &expired {
            state.remove(key);
        }
        let count = expired.len();
        if count > 0 {
            self.expirations.fetch_add(count as u64, Ordering::Relaxed);
            debug!("swept {} expired cache entries", count);
        }
        count
    }

    /// Periodically sweep expired entries until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.sweep_expired();
            }
        })
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current total estimated size of all entries
    pub fn memory_bytes(&self) -> usize {
        lock(&self.state).memory_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes) = {
            let state = lock(&self.state);
            (state.entries.len(), state.memory_bytes)
        };
        CacheStats {
            entries,
            memory_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::build(CacheConfig::default())
    }
}

/// Wait for the leader's outcome; `None` if it was dropped without one
async fn wait_for_leader(mut receiver: watch::Receiver<Option<Outcome>>) -> Option<Outcome> {
    loop {
        let current = receiver.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if receiver.changed().await.is_err() {
            return receiver.borrow().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key(content: &str) -> CacheKey {
        CacheKey::new("test", 1, content, None)
    }

    fn small_cache(max_entries: usize) -> ValidationCache {
        ValidationCache::new(CacheConfig::default().with_max_entries(max_entries)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(ValidationCache::new(CacheConfig::default().with_max_entries(0)).is_err());
        let huge_ttl = CacheConfig {
            ttl_seconds: 1e20,
            ..Default::default()
        };
        assert!(matches!(
            ValidationCache::new(huge_ttl),
            Err(crate::error::VloopError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_very_long_ttl_never_expires() {
        let config = CacheConfig::default().with_ttl(Some(Duration::from_secs(u64::MAX / 2)));
        let cache = ValidationCache::new(config).unwrap();
        assert!(cache.insert(key("a"), ValidationResult::pass()));
        assert!(cache.contains(&key("a")));
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[test]
    fn test_get_and_insert() {
        let cache = small_cache(10);
        assert!(cache.get(&key("a")).is_none());

        assert!(cache.insert(key("a"), ValidationResult::fail("bad")));
        let cached = cache.get(&key("a")).unwrap();
        assert_eq!(cached.errors, vec!["bad".to_string()]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lru_eviction_removes_least_recently_used() {
        let cache = small_cache(3);
        cache.insert(key("a"), ValidationResult::pass());
        cache.insert(key("b"), ValidationResult::pass());
        cache.insert(key("c"), ValidationResult::pass());

        // a becomes most recent, b is now the oldest
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("d"), ValidationResult::pass());

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("a")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_memory_cap_is_respected() {
        let one = key("x").as_str().len() + 1 + ValidationResult::pass().estimated_size();
        let cache = ValidationCache::new(CacheConfig::default().with_max_memory_bytes(one * 2)).unwrap();

        cache.insert(key("1"), ValidationResult::pass());
        cache.insert(key("2"), ValidationResult::pass());
        cache.insert(key("3"), ValidationResult::pass());

        assert_eq!(cache.len(), 2);
        assert!(cache.memory_bytes() <= one * 2);
        assert!(!cache.contains(&key("1")));
    }

    #[test]
    fn test_oversized_entry_is_not_stored() {
        let cache = ValidationCache::new(CacheConfig::default().with_max_memory_bytes(64)).unwrap();
        assert!(!cache.insert(key("a"), ValidationResult::fail("x".repeat(200))));
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let cache = small_cache(10);
        cache.insert(key("a"), ValidationResult::pass());
        let before = cache.memory_bytes();
        cache.insert(key("a"), ValidationResult::pass());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_bytes(), before);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let config = CacheConfig::default().with_ttl(Some(Duration::from_millis(50)));
        let cache = ValidationCache::new(config).unwrap();
        cache.insert(key("a"), ValidationResult::pass());
        assert!(cache.contains(&key("a")));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.contains(&key("a")));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let config = CacheConfig::default().with_ttl(Some(Duration::from_millis(30)));
        let cache = ValidationCache::new(config).unwrap();
        cache.insert(key("a"), ValidationResult::pass());
        cache.insert(key("b"), ValidationResult::pass());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.sweep_expired(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[tokio::test]
    async fn test_background_sweeper() {
        let config = CacheConfig::default().with_ttl(Some(Duration::from_millis(20)));
        let cache = Arc::new(ValidationCache::new(config).unwrap());
        let handle = cache.spawn_sweeper(Duration::from_millis(10));
        cache.insert(key("a"), ValidationResult::pass());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = small_cache(10);
        cache.insert(key("a"), ValidationResult::pass());
        cache.insert(key("b"), ValidationResult::pass());

        assert!(cache.invalidate(&key("a")));
        assert!(!cache.invalidate(&key("a")));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once() {
        let cache = small_cache(10);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache
                .get_or_compute(&key("a"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ValidationResult::fail("nope"))
                })
                .await
                .unwrap();
            assert_eq!(result.errors, vec!["nope".to_string()]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_is_not_cached() {
        let cache = small_cache(10);

        let err = cache
            .get_or_compute(&key("a"), || async { Err(ValidatorError::Internal("boom".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, ValidatorError::Internal("boom".into()));
        assert!(!cache.contains(&key("a")));

        let ok = cache
            .get_or_compute(&key("a"), || async { Ok(ValidationResult::pass()) })
            .await
            .unwrap();
        assert!(ok.is_valid);
        assert!(cache.contains(&key("a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_shares_computation() {
        let cache = Arc::new(small_cache(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute(&key("shared"), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(ValidationResult::pass().with_metadata("n", 1))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.metadata["n"], 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_leader_hands_over() {
        let cache = Arc::new(small_cache(10));

        // Leader that never finishes, then gets cancelled
        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key("k"), || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(ValidationResult::pass())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key("k"), || async { Ok(ValidationResult::fail("recomputed")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let result = tokio::time::timeout(Duration::from_secs(1), follower)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result.errors, vec!["recomputed".to_string()]);
    }
}
