//! TTL + capacity-bounded response cache.
//!
//! Maps a request fingerprint to the final endpoint response body (and the
//! model that produced it) with an absolute expiry. Expiration is lazy: a
//! stale entry is purged by the read that observes it, there is no
//! background sweep. When an insertion grows the map past its capacity,
//! exactly one entry is evicted: the oldest by insertion order.
//!
//! Insertion-order eviction is an approximation of LRU, not true LRU:
//! read hits do not refresh an entry's position, only overwrites do. This
//! mirrors the original behavior and is kept deliberately; under hot-key
//! reuse a frequently-read entry can still be evicted first.
//!
//! The cache stores the fully rendered response body, so a later HIT is
//! byte-identical to the MISS that populated it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Configuration for a response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for cached entries.
    pub ttl: Duration,
    /// Maximum number of cached entries.
    pub max_entries: usize,
}

/// A cached, fully rendered endpoint response.
#[derive(Debug, Clone)]
pub struct CachedReply {
    /// The endpoint's success body, exactly as it was first returned.
    pub body: serde_json::Value,
    /// The upstream model that produced the body.
    pub model: String,
}

#[derive(Debug)]
struct CacheEntry {
    reply: CachedReply,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<u64, CacheEntry>,
    order: VecDeque<u64>,
}

/// In-memory response cache with lazy TTL expiration and insertion-order
/// eviction.
///
/// Process-local only: separate instances (e.g. horizontally scaled
/// replicas) each hold independent caches.
pub struct ResponseCache {
    endpoint: &'static str,
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    /// Create a cache for the named endpoint.
    pub fn new(endpoint: &'static str, config: CacheConfig) -> Self {
        Self {
            endpoint,
            ttl: config.ttl,
            max_entries: config.max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Look up a fingerprint. Absent if never set or expired; an expired
    /// entry is removed by this read. Emits cache hit/miss metrics.
    pub fn get(&self, key: u64) -> Option<CachedReply> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let expired = match inner.entries.get(&key) {
            None => {
                metrics::counter!(crate::telemetry::CACHE_MISSES_TOTAL, "endpoint" => self.endpoint)
                    .increment(1);
                return None;
            }
            Some(entry) => Instant::now() >= entry.expires_at,
        };
        if expired {
            inner.entries.remove(&key);
            inner.order.retain(|candidate| *candidate != key);
            metrics::counter!(crate::telemetry::CACHE_MISSES_TOTAL, "endpoint" => self.endpoint)
                .increment(1);
            return None;
        }
        metrics::counter!(crate::telemetry::CACHE_HITS_TOTAL, "endpoint" => self.endpoint)
            .increment(1);
        inner.entries.get(&key).map(|entry| entry.reply.clone())
    }

    /// Insert or overwrite an entry with a fresh TTL.
    ///
    /// An overwrite moves the key to the back of the insertion order. If
    /// the insertion grows the map past capacity, the front-most key is
    /// evicted regardless of its freshness.
    pub fn insert(&self, key: u64, reply: CachedReply) {
        if self.max_entries == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let entry = CacheEntry {
            reply,
            expires_at: Instant::now() + self.ttl,
        };
        if inner.entries.insert(key, entry).is_some() {
            inner.order.retain(|candidate| *candidate != key);
        }
        inner.order.push_back(key);
        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    /// Current number of live (possibly stale) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
