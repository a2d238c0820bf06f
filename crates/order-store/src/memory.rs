//! # In-Memory Store
//!
//! A [`OrderStore`] over plain maps guarded by one mutex. It keeps the same table
//! shape as the Postgres schema (orders, payments, items, order_items) so that item
//! deduplication and "order without payment is invisible" behave identically.
//!
//! The counters ([`MemoryStore::order_count`], [`MemoryStore::item_count`],
//! [`MemoryStore::association_count`], [`MemoryStore::insert_order_calls`]) exist so
//! tests can assert on what reached the store, not just on what comes back out.

use crate::error::{StoreError, StoreResult};
use crate::model::{Item, Order, Payment};
use crate::store::OrderStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Tables {
    /// Order rows. `payment` and `items` of the stored value are never read back.
    orders: HashMap<String, Order>,
    /// Insertion order of `orders`, so `get_orders` is deterministic.
    order_keys: Vec<String>,
    payments: HashMap<String, Payment>,
    items: HashMap<i64, Item>,
    order_items: Vec<(String, i64)>,
    insert_order_calls: usize,
}

impl Tables {
    fn items_for(&self, order_uid: &str) -> Vec<Item> {
        self.order_items
            .iter()
            .filter(|(uid, _)| uid == order_uid)
            .filter_map(|(_, chrt_id)| self.items.get(chrt_id).cloned())
            .collect()
    }

    fn assemble(&self, order_uid: &str) -> Option<Order> {
        let row = self.orders.get(order_uid)?;
        let payment = self.payments.get(order_uid)?;
        let mut order = row.clone();
        order.payment = payment.clone();
        order.items = self.items_for(order_uid);
        Some(order)
    }
}

/// In-process [`OrderStore`] with row counters.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding the given aggregates, written directly to the tables.
    pub fn seeded(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for order in orders {
                let uid = order.order_uid.clone();
                tables.payments.insert(uid.clone(), order.payment.clone());
                for item in &order.items {
                    tables.items.entry(item.chrt_id).or_insert_with(|| item.clone());
                }
                for chrt_id in order.chrt_ids() {
                    tables.order_items.push((uid.clone(), chrt_id));
                }
                if tables.orders.insert(uid.clone(), order).is_none() {
                    tables.order_keys.push(uid);
                }
            }
        }
        store
    }

    /// Number of order rows, including orders still missing their payment.
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    pub fn association_count(&self) -> usize {
        self.lock().order_items.len()
    }

    /// How many times `insert_order` was called, successful or not.
    pub fn insert_order_calls(&self) -> usize {
        self.lock().insert_order_calls
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_orders(&self) -> StoreResult<Vec<Order>> {
        let tables = self.lock();
        let orders: Vec<Order> = tables
            .order_keys
            .iter()
            .filter_map(|uid| tables.assemble(uid))
            .collect();
        debug!(size = orders.len(), "Loaded all orders");
        Ok(orders)
    }

    async fn get_order_by_uid(&self, order_uid: &str) -> StoreResult<Order> {
        self.lock()
            .assemble(order_uid)
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn get_items_by_uid(&self, order_uid: &str) -> StoreResult<Vec<Item>> {
        Ok(self.lock().items_for(order_uid))
    }

    async fn get_payment_by_uid(&self, order_uid: &str) -> StoreResult<Payment> {
        self.lock()
            .payments
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn item_exists(&self, chrt_id: i64) -> StoreResult<bool> {
        Ok(self.lock().items.contains_key(&chrt_id))
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.lock();
        tables.insert_order_calls += 1;
        if tables.orders.contains_key(&order.order_uid) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.order_uid
            )));
        }
        tables.order_keys.push(order.order_uid.clone());
        tables.orders.insert(order.order_uid.clone(), order.clone());
        debug!(order_uid = %order.order_uid, size = tables.orders.len(), "Inserted order row");
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.payments.contains_key(&payment.transaction) {
            return Err(StoreError::Conflict(format!(
                "payment {} already exists",
                payment.transaction
            )));
        }
        tables
            .payments
            .insert(payment.transaction.clone(), payment.clone());
        Ok(())
    }

    async fn insert_item(&self, item: &Item) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.items.contains_key(&item.chrt_id) {
            return Err(StoreError::Conflict(format!(
                "item {} already exists",
                item.chrt_id
            )));
        }
        tables.items.insert(item.chrt_id, item.clone());
        Ok(())
    }

    async fn insert_order_items(&self, order_uid: &str, chrt_ids: &[i64]) -> StoreResult<()> {
        let mut tables = self.lock();
        // All-or-nothing, like the single INSERT the Postgres backend issues.
        for chrt_id in chrt_ids {
            if !tables.items.contains_key(chrt_id) {
                return Err(StoreError::Backend(format!(
                    "item {chrt_id} does not exist"
                )));
            }
            if tables
                .order_items
                .iter()
                .any(|(uid, id)| uid == order_uid && id == chrt_id)
            {
                return Err(StoreError::Conflict(format!(
                    "order {order_uid} already references item {chrt_id}"
                )));
            }
        }
        tables
            .order_items
            .extend(chrt_ids.iter().map(|id| (order_uid.to_string(), *id)));
        Ok(())
    }
}
