use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::Order;
use crate::usecase::OrderCache;

// ============================================================================
// LRU Order Cache
// ============================================================================
//
// Capacity-bounded map from order uid to order snapshot. Recency is a
// monotonically increasing tick; the smallest tick is the eviction victim.
// A single mutex serialises all access; both consumption loops and the HTTP
// read path share one instance.
//
// ============================================================================

pub struct LruOrderCache {
    capacity: usize,
    inner: Mutex<LruState>,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

struct CacheEntry {
    order: Arc<Order>,
    last_used: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, uid: &str) -> Option<Arc<Order>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(uid)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, uid.to_string());
        Some(entry.order.clone())
    }

    fn insert(&mut self, order: Arc<Order>, capacity: usize) {
        let tick = self.next_tick();
        let uid = order.order_uid.clone();

        if let Some(previous) = self.entries.insert(
            uid.clone(),
            CacheEntry {
                order,
                last_used: tick,
            },
        ) {
            self.recency.remove(&previous.last_used);
        }
        self.recency.insert(tick, uid);

        while self.entries.len() > capacity {
            let Some((_, victim)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&victim);
            tracing::trace!(order_uid = %victim, "Evicted order from cache");
        }
    }
}

impl LruOrderCache {
    /// Create a cache holding at most `capacity` orders (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderCache for LruOrderCache {
    async fn get(&self, uid: &str) -> Option<Arc<Order>> {
        self.inner.lock().await.touch(uid)
    }

    async fn set(&self, order: Arc<Order>) {
        self.inner.lock().await.insert(order, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::sample_order;

    fn order_with_uid(uid: &str) -> Arc<Order> {
        let mut order = sample_order();
        order.order_uid = uid.to_string();
        Arc::new(order)
    }

    #[tokio::test]
    async fn test_set_then_get_returns_equal_order() {
        let cache = LruOrderCache::new(4);
        let order = order_with_uid("a");
        cache.set(order.clone()).await;

        let cached = cache.get("a").await.unwrap();
        assert_eq!(*cached, *order);
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_overflow_evicts_least_recently_used() {
        let cache = LruOrderCache::new(3);
        for uid in ["a", "b", "c"] {
            cache.set(order_with_uid(uid)).await;
        }

        // Refresh "a" so "b" becomes the oldest
        assert!(cache.get("a").await.is_some());
        cache.set(order_with_uid("d")).await;

        assert_eq!(cache.len().await, 3);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert!(cache.get("d").await.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_does_not_grow_cache() {
        let cache = LruOrderCache::new(2);
        cache.set(order_with_uid("a")).await;

        let mut replacement = (*order_with_uid("a")).clone();
        replacement.entry = "OTHER".to_string();
        cache.set(Arc::new(replacement)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("a").await.unwrap().entry, "OTHER");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let cache = LruOrderCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(order_with_uid("a")).await;
        cache.set(order_with_uid("b")).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_access_keeps_bound() {
        let cache = Arc::new(LruOrderCache::new(16));
        let mut handles = Vec::new();
        for worker in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let uid = format!("{worker}-{i}");
                    cache.set(order_with_uid(&uid)).await;
                    let _ = cache.get(&uid).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 16);
    }
}
