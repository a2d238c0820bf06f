//! # OrderStore Trait
//!
//! The contract every durable backend implements. Operations are deliberately
//! per-entity: composing them into "persist an aggregate" is the caller's job, and
//! there is no transaction spanning several calls.
//!
//! # Read Semantics
//! - [`OrderStore::get_orders`] and [`OrderStore::get_order_by_uid`] return fully
//!   assembled aggregates (payment and items attached).
//! - An order row whose payment row is missing is not returned by either. For
//!   `get_order_by_uid` that is reported as [`StoreError::NotFound`](crate::StoreError::NotFound).
//!
//! # Write Semantics
//! - [`OrderStore::insert_order`] writes only the order row (including its delivery
//!   document). Payment and items are ignored.
//! - Inserting a key that already exists fails with
//!   [`StoreError::Conflict`](crate::StoreError::Conflict).

use crate::error::StoreResult;
use crate::model::{Item, Order, Payment};
use async_trait::async_trait;

/// Durable storage for orders, payments, items and the order/item association.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Every stored order, fully assembled. Used for cache recovery at startup.
    async fn get_orders(&self) -> StoreResult<Vec<Order>>;

    /// One fully assembled order.
    async fn get_order_by_uid(&self, order_uid: &str) -> StoreResult<Order>;

    /// Items associated with an order. Empty if none (or no such order).
    async fn get_items_by_uid(&self, order_uid: &str) -> StoreResult<Vec<Item>>;

    /// The payment whose `transaction` equals `order_uid`.
    async fn get_payment_by_uid(&self, order_uid: &str) -> StoreResult<Payment>;

    /// Whether an item row with this `chrt_id` exists.
    async fn item_exists(&self, chrt_id: i64) -> StoreResult<bool>;

    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;

    /// Stores an item row. An existing row with the same `chrt_id` is never
    /// overwritten: backends either leave it as is or fail with
    /// [`StoreError::Conflict`](crate::StoreError::Conflict).
    async fn insert_item(&self, item: &Item) -> StoreResult<()>;

    /// Associates each `chrt_id` with the order. All rows are written by one call.
    async fn insert_order_items(&self, order_uid: &str, chrt_ids: &[i64]) -> StoreResult<()>;
}
