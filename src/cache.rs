//! Session cache for processed documents.
//!
//! A small table keyed by document id. Entries expire a fixed TTL after
//! insertion (reads do not extend it) and the least-recently-accessed entry is
//! evicted when a new document arrives at capacity. Every operation takes the
//! lock once, so bookkeeping stays consistent under concurrent requests.

use crate::chunking::{Chunk, ChunkQualityReport};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 25;
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The processed representation of a document kept for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub title: Option<String>,
    pub chunks: Vec<Chunk>,
    pub quality: ChunkQualityReport,
    pub processed_at: DateTime<Utc>,
}

/// A cached payload with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub document_id: String,
    pub payload: V,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    /// Monotonic touch order; breaks ties between equal timestamps.
    access_seq: u64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_seconds: i64,
    pub total_accesses: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Capacity- and TTL-bounded document cache.
pub struct SessionCache<V = ProcessedDocument> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    ttl: Duration,
    clock: Box<dyn Clock>,
}

impl<V: Clone> SessionCache<V> {
    /// Create a cache with the default capacity and TTL.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    /// Create a cache with explicit limits. A zero capacity is treated as one.
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            ttl,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // The table stays structurally valid even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a payload, recording the access. Expired entries are removed.
    pub fn get(&self, document_id: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if Self::expire_if_stale(&mut inner, document_id, now) {
            return None;
        }

        let seq = inner.bump_seq();
        let entry = inner.entries.get_mut(document_id)?;
        entry.access_count += 1;
        entry.last_accessed_at = now;
        entry.access_seq = seq;
        Some(entry.payload.clone())
    }

    /// Whether a live entry exists. Does not count as an access.
    pub fn has(&self, document_id: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();

        if Self::expire_if_stale(&mut inner, document_id, now) {
            return false;
        }
        inner.entries.contains_key(document_id)
    }

    /// Insert or replace a payload.
    ///
    /// A new key at capacity evicts the least-recently-accessed entry first.
    /// Replacing an existing key resets its TTL and counters.
    pub fn set(&self, document_id: &str, payload: V) {
        let now = self.clock.now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(document_id) && inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .values()
                .min_by_key(|e| (e.last_accessed_at, e.access_seq))
                .map(|e| e.document_id.clone());

            if let Some(victim) = victim {
                inner.entries.remove(&victim);
                debug!("Session cache evicted {} to admit {}", victim, document_id);
            }
        }

        let seq = inner.bump_seq();
        inner.entries.insert(
            document_id.to_string(),
            CacheEntry {
                document_id: document_id.to_string(),
                payload,
                expires_at: now + self.ttl,
                access_count: 0,
                last_accessed_at: now,
                access_seq: seq,
            },
        );
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();

        let before = inner.entries.len();
        inner.entries.retain(|_, e| now <= e.expires_at);
        let removed = before - inner.entries.len();

        if removed > 0 {
            debug!("Session cache cleanup removed {} expired entries", removed);
        }
        removed
    }

    /// Drop one entry. Returns whether it was present.
    pub fn remove(&self, document_id: &str) -> bool {
        self.lock().entries.remove(document_id).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of an entry's bookkeeping without recording an access.
    pub fn entry(&self, document_id: &str) -> Option<CacheEntry<V>> {
        self.lock().entries.get(document_id).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            ttl_seconds: self.ttl.num_seconds(),
            total_accesses: inner.entries.values().map(|e| e.access_count).sum(),
        }
    }

    /// Remove `document_id` if it has expired. Returns true when removed.
    fn expire_if_stale(inner: &mut Inner<V>, document_id: &str, now: DateTime<Utc>) -> bool {
        let stale = inner
            .entries
            .get(document_id)
            .is_some_and(|e| now > e.expires_at);
        if stale {
            inner.entries.remove(document_id);
            debug!("Session cache entry {} expired", document_id);
        }
        stale
    }
}

impl<V: Clone> Default for SessionCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Clock that only moves when told to.
    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Utc::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn cache_with_clock() -> (SessionCache<String>, ManualClock) {
        let clock = ManualClock::new();
        let cache = SessionCache::with_limits(25, Duration::minutes(30)).with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_round_trip_counts_accesses() {
        let (cache, _clock) = cache_with_clock();
        cache.set("doc", "payload".to_string());

        assert_eq!(cache.get("doc").as_deref(), Some("payload"));
        assert_eq!(cache.entry("doc").unwrap().access_count, 1);
        assert_eq!(cache.get("doc").as_deref(), Some("payload"));
        assert_eq!(cache.entry("doc").unwrap().access_count, 2);
    }

    #[test]
    fn test_has_does_not_count_access() {
        let (cache, _clock) = cache_with_clock();
        cache.set("doc", "payload".to_string());
        assert!(cache.has("doc"));
        assert_eq!(cache.entry("doc").unwrap().access_count, 0);
        assert!(!cache.has("other"));
    }

    #[test]
    fn test_ttl_is_not_sliding() {
        let (cache, clock) = cache_with_clock();
        cache.set("doc", "payload".to_string());

        clock.advance(Duration::minutes(20));
        assert!(cache.get("doc").is_some());

        clock.advance(Duration::minutes(11));
        assert!(cache.get("doc").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_has_expires_lazily() {
        let (cache, clock) = cache_with_clock();
        cache.set("doc", "payload".to_string());
        clock.advance(Duration::minutes(31));

        assert_eq!(cache.len(), 1);
        assert!(!cache.has("doc"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed() {
        let (cache, clock) = cache_with_clock();
        for i in 0..25 {
            cache.set(&format!("doc-{}", i), format!("payload-{}", i));
            clock.advance(Duration::seconds(1));
        }

        // doc-0 is touched, making doc-1 the least recently accessed.
        assert!(cache.get("doc-0").is_some());
        clock.advance(Duration::seconds(1));

        cache.set("doc-25", "payload-25".to_string());

        assert_eq!(cache.len(), 25);
        assert!(!cache.has("doc-1"));
        assert!(cache.has("doc-0"));
        assert!(cache.has("doc-25"));
    }

    #[test]
    fn test_equal_timestamps_evict_oldest_touch() {
        let cache = SessionCache::with_limits(2, Duration::minutes(30)).with_clock(ManualClock::new());
        cache.set("a", 1);
        cache.set("b", 2);
        cache.get("a");
        cache.set("c", 3);

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn test_replacing_key_at_capacity_does_not_evict() {
        let clock = ManualClock::new();
        let cache = SessionCache::with_limits(2, Duration::minutes(30)).with_clock(clock.clone());
        cache.set("a", 1);
        cache.set("b", 2);
        cache.get("a");

        clock.advance(Duration::minutes(10));
        cache.set("b", 20);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), Some(20));
        let entry = cache.entry("b").unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.expires_at, clock.now() + Duration::minutes(30));
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let (cache, clock) = cache_with_clock();
        cache.set("old-1", "a".to_string());
        cache.set("old-2", "b".to_string());
        clock.advance(Duration::minutes(20));
        cache.set("fresh", "c".to_string());
        clock.advance(Duration::minutes(15));

        assert_eq!(cache.cleanup(), 2);
        assert!(cache.has("fresh"));
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn test_clear_and_stats() {
        let (cache, _clock) = cache_with_clock();
        cache.set("a", "1".to_string());
        cache.get("a");
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 25);
        assert_eq!(stats.ttl_seconds, 1800);
        assert_eq!(stats.total_accesses, 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sets_fill_to_capacity() {
        let cache: Arc<SessionCache<String>> = Arc::new(SessionCache::new());

        let handles: Vec<_> = (0..30)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache.set(&format!("doc-{}", i), format!("payload-{}", i));
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 25);
        let live = (0..30).filter(|i| cache.has(&format!("doc-{}", i))).count();
        assert_eq!(live, 25);
        for i in 0..30 {
            if let Some(entry) = cache.entry(&format!("doc-{}", i)) {
                assert_eq!(entry.access_count, 0);
                assert_eq!(entry.payload, format!("payload-{}", i));
                assert!(entry.expires_at > entry.last_accessed_at);
            }
        }
    }
}
