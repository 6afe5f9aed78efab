//! Range Cache
//!
//! TTL-bounded cache of search results keyed by resolved block range. Each
//! entry expires `ttl` after insertion; when the cache is full the oldest
//! entry is evicted. The cache is never a source of truth: a miss simply
//! means the range is fetched again.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Inclusive block range used as cache key
pub type RangeKey = (u64, u64);

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 64,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CacheInner<V> {
    entries: HashMap<RangeKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

pub struct RangeCache<V> {
    config: CacheConfig,
    inner: RwLock<CacheInner<V>>,
}

impl<V: Clone> RangeCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a fresh entry; an expired one is dropped and counts as a miss
    pub async fn get(&self, key: RangeKey) -> Option<V> {
        let mut inner = self.inner.write().await;
        let fresh = match inner.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.config.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(&key);
                None
            }
            None => None,
        };

        if fresh.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        fresh
    }

    pub async fn insert(&self, key: RangeKey, value: V) {
        if self.config.max_entries == 0 {
            return;
        }
        let mut inner = self.inner.write().await;
        let ttl = self.config.ttl;
        inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                tracing::debug!(from_block = oldest.0, to_block = oldest.1, "Evicted oldest cached range");
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}
