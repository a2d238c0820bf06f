//! # Order Store
//!
//! This crate is the durable side of the order cache service. It defines the order
//! aggregate, the [`OrderStore`] contract the rest of the system persists through,
//! and the backends that implement it.
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into three layers:
//!
//! 1. **Model Layer** ([`model`]) - The `Order` aggregate with its `Payment`, `Item`s
//!    and embedded `Delivery`, exactly as they travel over the wire.
//! 2. **Contract Layer** ([`OrderStore`]) - Atomic per-entity inserts and selects.
//!    Nothing above this trait knows which database is underneath.
//! 3. **Backend Layer** - [`PostgresStore`] for production, [`MemoryStore`] for local
//!    runs and tests, [`MockStore`] for injecting failures.
//!
//! ## Items Are Shared
//!
//! An `Item` row is keyed by `chrt_id` and written at most once. Orders reference
//! items through an association table, so two orders carrying the same `chrt_id`
//! produce one item row and two association rows.
//!
//! ## No Cross-Entity Transactions
//!
//! Each operation on [`OrderStore`] is atomic on its own. Writing an aggregate is a
//! sequence of calls (order, payment, items, associations) and a failure midway leaves
//! the rows written so far in place. Readers never observe an order without its
//! payment: both read paths join the two tables.
//!
//! ## Example
//!
//! ```rust
//! use order_store::{MemoryStore, Order, OrderStore, StoreError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let mut order = Order::default();
//!     order.order_uid = "b563feb7b2b84b6test".to_string();
//!     order.payment.transaction = order.order_uid.clone();
//!
//!     store.insert_order(&order).await.unwrap();
//!     store.insert_payment(&order.payment).await.unwrap();
//!
//!     let loaded = store.get_order_by_uid("b563feb7b2b84b6test").await.unwrap();
//!     assert_eq!(loaded, order);
//!
//!     let missing = store.get_order_by_uid("nope").await;
//!     assert!(matches!(missing, Err(StoreError::NotFound(_))));
//! }
//! ```
//!
//! ## Testing
//!
//! The [`mock`] module provides `MockStore`, an expectation-driven double that lets
//! callers script failures (timeouts, conflicts) at any step of the write sequence.

pub mod error;
pub mod memory;
pub mod mock;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use mock::MockStore;
pub use model::{Delivery, Item, Order, Payment};
pub use postgres::{PostgresConfig, PostgresStore};
pub use store::OrderStore;
