//! Cache-aside point lookups.

use crate::cache::OrderCache;
use order_store::{Order, OrderStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors that can occur during an order lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Neither the cache nor the store knows the order.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// The store could not answer.
    #[error("Lookup failed: {0}")]
    Store(#[source] StoreError),
}

/// Serves `get_order` from the cache, falling back to the store on a miss.
#[derive(Clone)]
pub struct LookupService {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
}

impl LookupService {
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderStore>) -> Self {
        Self { cache, store }
    }

    /// Returns the order for `order_uid`.
    ///
    /// On a cache miss the order is read from the store, written into the cache and
    /// then returned.
    pub async fn get_order(&self, order_uid: &str) -> Result<Order, LookupError> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!(%order_uid, "Cache hit");
            return Ok(order);
        }

        debug!(%order_uid, "Cache miss, reading store");
        match self.store.get_order_by_uid(order_uid).await {
            Ok(order) => {
                self.cache.set(order_uid, order.clone());
                debug!(%order_uid, size = self.cache.len(), "Cache back-filled");
                Ok(order)
            }
            Err(StoreError::NotFound(_)) => Err(LookupError::NotFound(order_uid.to_string())),
            Err(e) => {
                error!(%order_uid, error = %e, "Store lookup failed");
                Err(LookupError::Store(e))
            }
        }
    }
}
