//! # Order Cache
//!
//! A process-local, unbounded mirror of every known order keyed by `order_uid`.
//!
//! ## Concurrency
//!
//! One `RwLock` guards the map. [`OrderCache::get`], [`OrderCache::contains`] and
//! [`OrderCache::get_all`] take it shared; [`OrderCache::set`] and the final step of
//! [`OrderCache::recover`] take it exclusively. The lock is never held across an
//! `.await`: store I/O always happens before the guard is taken.
//!
//! Values go in and come out by clone. Nothing outside the cache ever holds a
//! reference into the map.

use order_store::{Order, OrderStore, StoreResult};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Concurrent map from `order_uid` to the full order aggregate.
#[derive(Debug, Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cached order, if present.
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        self.read().get(order_uid).cloned()
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.read().contains_key(order_uid)
    }

    /// Inserts or overwrites. Last writer wins.
    pub fn set(&self, order_uid: impl Into<String>, order: Order) {
        self.write().insert(order_uid.into(), order);
    }

    /// Snapshot of every cached order, in no particular order.
    pub fn get_all(&self) -> Vec<Order> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Loads every order from `store` into the map and returns how many were loaded.
    ///
    /// Must complete before the cache is shared with ingestion or lookups. On error
    /// the map is left untouched and the caller must not start serving.
    pub async fn recover(&self, store: &dyn OrderStore) -> StoreResult<usize> {
        let orders = store.get_orders().await?;
        let count = orders.len();

        let mut map = self.write();
        for order in orders {
            map.insert(order.order_uid.clone(), order);
        }
        info!(recovered = count, size = map.len(), "Cache recovered from store");
        Ok(count)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Order>> {
        self.orders.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Order>> {
        self.orders.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_store::{MemoryStore, MockStore, StoreError};
    use std::sync::Arc;
    use std::time::Duration;

    fn order(uid: &str) -> Order {
        let mut order = Order {
            order_uid: uid.to_string(),
            ..Order::default()
        };
        order.payment.transaction = uid.to_string();
        order
    }

    #[test]
    fn test_get_set_overwrite() {
        let cache = OrderCache::new();
        assert!(cache.get("o1").is_none());
        assert!(cache.is_empty());

        cache.set("o1", order("o1"));
        assert!(cache.contains("o1"));
        assert_eq!(cache.get("o1").unwrap().order_uid, "o1");

        let mut newer = order("o1");
        newer.track_number = "NEW".to_string();
        cache.set("o1", newer);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("o1").unwrap().track_number, "NEW");
    }

    #[test]
    fn test_returned_values_are_copies() {
        let cache = OrderCache::new();
        cache.set("o1", order("o1"));

        let mut copy = cache.get("o1").unwrap();
        copy.track_number = "MUTATED".to_string();

        assert_eq!(cache.get("o1").unwrap().track_number, "");
    }

    #[tokio::test]
    async fn test_recover_loads_every_stored_order() {
        let store = MemoryStore::seeded(vec![order("o1"), order("o2"), order("o3")]);
        let cache = OrderCache::new();

        let loaded = cache.recover(&store).await.unwrap();

        assert_eq!(loaded, 3);
        for uid in ["o1", "o2", "o3"] {
            assert_eq!(
                cache.get(uid).unwrap(),
                store.get_order_by_uid(uid).await.unwrap()
            );
        }
        let mut all: Vec<String> = cache.get_all().into_iter().map(|o| o.order_uid).collect();
        all.sort();
        assert_eq!(all, vec!["o1", "o2", "o3"]);
    }

    #[tokio::test]
    async fn test_recover_failure_leaves_cache_empty() {
        let store = MockStore::new();
        store
            .expect_get_orders()
            .return_err(StoreError::Timeout(Duration::from_secs(5)));
        let cache = OrderCache::new();

        let result = cache.recover(&store).await;

        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert!(cache.is_empty());
        store.verify();
    }

    #[tokio::test]
    async fn test_concurrent_get_and_set() {
        let cache = Arc::new(OrderCache::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let uid = format!("o{}", i % 20);
                    let mut o = order(&uid);
                    o.sm_id = worker;
                    cache.set(uid.clone(), o);
                    let read = cache.get(&uid).unwrap();
                    assert_eq!(read.order_uid, uid);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 20);
        for o in cache.get_all() {
            assert!((0..8).contains(&o.sm_id));
        }
    }
}
