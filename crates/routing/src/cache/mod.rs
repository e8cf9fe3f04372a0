//! Pluggable response cache.
//!
//! Market data is latency sensitive, so entries are short-lived (10 seconds
//! by default). The backend is chosen at construction time behind the
//! [`CacheStore`] trait; [`MemoryCache`] is the in-process implementation,
//! and a remote store plugs in by implementing the same trait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

use crate::errors::CacheError;

/// Key/value store with TTL support.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a key. Expired entries behave as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Drop a key.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order for overflow eviction. May hold keys already removed
    /// by lazy expiry or delete; those are skipped when evicting.
    order: VecDeque<String>,
}

/// Bounded in-process cache.
///
/// Expired entries are evicted lazily on read. When a write pushes the map
/// over capacity, the oldest-inserted entry goes first - insertion order,
/// not LRU; entries are short-lived by TTL regardless. Overwriting an
/// existing key keeps its original insertion position.
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` live entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries,
        }
    }

    /// Lock the cache interior, recovering from poison if necessary.
    /// Worst case after recovery is a stale or missing entry, which the
    /// TTL bounds anyway.
    fn lock_inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut guard = self.lock_inner();

        let expired = match guard.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            guard.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let expires_at = Instant::now() + ttl;

        match inner.entries.entry(key.to_string()) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.value = value;
                entry.expires_at = expires_at;
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(CacheEntry { value, expires_at });
                inner.order.push_back(key.to_string());
            }
        }

        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.entries.remove(&oldest).is_some() {
                debug!("Cache over capacity, evicted oldest entry '{}'", oldest);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock_inner().entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_returns_stored_value_before_ttl() {
        let cache = MemoryCache::new(10);
        cache
            .set("quote:AAPL", json!({"price": 182.5}), Duration::from_secs(10))
            .await
            .unwrap();

        let value = cache.get("quote:AAPL").await.unwrap();
        assert_eq!(value, Some(json!({"price": 182.5})));
    }

    #[tokio::test]
    async fn test_get_after_expiry_returns_none() {
        let cache = MemoryCache::new(10);
        cache
            .set("quote:AAPL", json!(1), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("quote:AAPL").await.unwrap(), None);
        // Lazy eviction removed the entry on read.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_inserted() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);

        cache.set("a", json!(1), ttl).await.unwrap();
        cache.set("b", json!(2), ttl).await.unwrap();
        cache.set("c", json!(3), ttl).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));
        assert_eq!(cache.get("c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_insertion_position() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);

        cache.set("a", json!(1), ttl).await.unwrap();
        cache.set("b", json!(2), ttl).await.unwrap();
        // Refreshing "a" does not make it newest.
        cache.set("a", json!(10), ttl).await.unwrap();
        cache.set("c", json!(3), ttl).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = MemoryCache::new(10);
        cache
            .set("k", json!("v"), Duration::from_secs(60))
            .await
            .unwrap();

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eviction_skips_stale_order_keys() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);

        cache.set("a", json!(1), ttl).await.unwrap();
        cache.delete("a").await.unwrap();
        cache.set("b", json!(2), ttl).await.unwrap();
        cache.set("c", json!(3), ttl).await.unwrap();
        cache.set("d", json!(4), ttl).await.unwrap();

        // "a" was already gone; "b" is the oldest live entry.
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some(json!(3)));
        assert_eq!(cache.get("d").await.unwrap(), Some(json!(4)));
    }
}
