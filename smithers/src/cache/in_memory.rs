//! In-memory LRU cache with optional per-entry TTL.
//!
//! Backs the middleware pipeline's caching built-in (spec §4.4 "LRU keyed by
//! the node content hash"). Grounded on the teacher's `dashmap` usage
//! elsewhere in the crate for concurrent maps without an external
//! lock-per-access; eviction order is tracked separately since `DashMap`
//! itself has no LRU ordering.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheError};

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

/// Thread-safe LRU cache. `capacity` bounds the number of live entries;
/// insert beyond capacity evicts the least-recently-touched key.
pub struct InMemoryCache<K, V> {
    capacity: usize,
    entries: DashMap<K, Entry<V>>,
    order: Mutex<VecDeque<K>>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn touch(&self, key: &K) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }

    fn evict_if_needed(&self) {
        let mut order = self.order.lock().unwrap();
        while self.entries.len() > self.capacity {
            let Some(oldest) = order.pop_front() else { break };
            self.entries.remove(&oldest);
        }
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).and_then(|entry| {
            let expired = entry.expires_at.is_some_and(|at| Instant::now() >= at);
            if expired {
                None
            } else {
                Some(entry.value.clone())
            }
        });
        if hit.is_some() {
            self.touch(key);
        } else {
            self.entries.remove(key);
        }
        hit
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(key.clone(), Entry { value, expires_at });
        self.touch(&key);
        self.evict_if_needed();
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), CacheError> {
        self.entries.remove(key);
        self.order.lock().unwrap().retain(|k| k != key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        self.order.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_round_trip() {
        let cache: InMemoryCache<String, String> = InMemoryCache::new();
        cache.set("k".into(), "v".into(), None).await.unwrap();
        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_returns_none() {
        let cache: InMemoryCache<String, String> = InMemoryCache::new();
        cache
            .set("k".into(), "v".into(), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache: InMemoryCache<String, String> = InMemoryCache::with_capacity(2);
        cache.set("a".into(), "1".into(), None).await.unwrap();
        cache.set("b".into(), "2".into(), None).await.unwrap();
        // touch "a" so "b" becomes the least-recently-used entry.
        cache.get(&"a".to_string()).await;
        cache.set("c".into(), "3".into(), None).await.unwrap();
        assert_eq!(cache.get(&"b".to_string()).await, None);
        assert_eq!(cache.get(&"a".to_string()).await, Some("1".to_string()));
        assert_eq!(cache.get(&"c".to_string()).await, Some("3".to_string()));
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache: InMemoryCache<String, String> = InMemoryCache::new();
        cache.set("a".into(), "1".into(), None).await.unwrap();
        cache.delete(&"a".to_string()).await.unwrap();
        assert_eq!(cache.get(&"a".to_string()).await, None);
        cache.set("b".into(), "2".into(), None).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.get(&"b".to_string()).await, None);
    }
}
