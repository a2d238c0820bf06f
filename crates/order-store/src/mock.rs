//! # Mock Store & Failure Injection
//!
//! `MockStore` implements [`OrderStore`] from a FIFO queue of scripted responses.
//! Every call pops the next expectation; the operation it was scripted for must
//! match the call that arrives, otherwise the mock panics.
//!
//! ## When to use MockStore vs MemoryStore
//!
//! | Feature | MockStore | MemoryStore |
//! |---------|-----------|-------------|
//! | **State** | None (scripted responses) | Real tables |
//! | **Call order** | Asserted | Not checked |
//! | **Error Injection** | Any step (`return_err`) | Only natural conflicts |
//! | **Use Case** | Failure paths, call sequences | Behavior over many messages |
//!
//! ## Example
//!
//! ```rust
//! use order_store::{MockStore, Order, OrderStore, StoreError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockStore::new();
//!     mock.expect_insert_order().return_ok(());
//!     mock.expect_insert_payment()
//!         .return_err(StoreError::Timeout(Duration::from_secs(5)));
//!
//!     let order = Order::default();
//!     assert!(mock.insert_order(&order).await.is_ok());
//!     let result = mock.insert_payment(&order.payment).await;
//!     assert!(matches!(result, Err(StoreError::Timeout(_))));
//!
//!     // Ensures all expectations were consumed
//!     mock.verify();
//! }
//! ```

use crate::error::{StoreError, StoreResult};
use crate::model::{Item, Order, Payment};
use crate::store::OrderStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// A scripted response for one store call.
enum Expectation {
    GetOrders(StoreResult<Vec<Order>>),
    GetOrderByUid {
        order_uid: String,
        response: StoreResult<Order>,
    },
    GetItemsByUid {
        order_uid: String,
        response: StoreResult<Vec<Item>>,
    },
    GetPaymentByUid {
        order_uid: String,
        response: StoreResult<Payment>,
    },
    ItemExists {
        chrt_id: i64,
        response: StoreResult<bool>,
    },
    InsertOrder(StoreResult<()>),
    InsertPayment(StoreResult<()>),
    InsertItem(StoreResult<()>),
    InsertOrderItems(StoreResult<()>),
}

impl Expectation {
    fn name(&self) -> &'static str {
        match self {
            Expectation::GetOrders(_) => "get_orders",
            Expectation::GetOrderByUid { .. } => "get_order_by_uid",
            Expectation::GetItemsByUid { .. } => "get_items_by_uid",
            Expectation::GetPaymentByUid { .. } => "get_payment_by_uid",
            Expectation::ItemExists { .. } => "item_exists",
            Expectation::InsertOrder(_) => "insert_order",
            Expectation::InsertPayment(_) => "insert_payment",
            Expectation::InsertItem(_) => "insert_item",
            Expectation::InsertOrderItems(_) => "insert_order_items",
        }
    }
}

type Queue = Arc<Mutex<VecDeque<Expectation>>>;

/// An [`OrderStore`] driven by scripted expectations.
#[derive(Default)]
pub struct MockStore {
    expectations: Queue,
}

impl MockStore {
    /// Creates a new mock store with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_get_orders(&self) -> ExpectationBuilder<Vec<Order>> {
        self.builder::<Vec<Order>>(Box::new(Expectation::GetOrders))
    }

    pub fn expect_get_order_by_uid(&self, order_uid: &str) -> ExpectationBuilder<Order> {
        let order_uid = order_uid.to_string();
        self.builder::<Order>(Box::new(move |response| Expectation::GetOrderByUid {
            order_uid,
            response,
        }))
    }

    pub fn expect_get_items_by_uid(&self, order_uid: &str) -> ExpectationBuilder<Vec<Item>> {
        let order_uid = order_uid.to_string();
        self.builder::<Vec<Item>>(Box::new(move |response| Expectation::GetItemsByUid {
            order_uid,
            response,
        }))
    }

    pub fn expect_get_payment_by_uid(&self, order_uid: &str) -> ExpectationBuilder<Payment> {
        let order_uid = order_uid.to_string();
        self.builder::<Payment>(Box::new(move |response| Expectation::GetPaymentByUid {
            order_uid,
            response,
        }))
    }

    pub fn expect_item_exists(&self, chrt_id: i64) -> ExpectationBuilder<bool> {
        self.builder::<bool>(Box::new(move |response| Expectation::ItemExists {
            chrt_id,
            response,
        }))
    }

    pub fn expect_insert_order(&self) -> ExpectationBuilder<()> {
        self.builder::<()>(Box::new(Expectation::InsertOrder))
    }

    pub fn expect_insert_payment(&self) -> ExpectationBuilder<()> {
        self.builder::<()>(Box::new(Expectation::InsertPayment))
    }

    pub fn expect_insert_item(&self) -> ExpectationBuilder<()> {
        self.builder::<()>(Box::new(Expectation::InsertItem))
    }

    pub fn expect_insert_order_items(&self) -> ExpectationBuilder<()> {
        self.builder::<()>(Box::new(Expectation::InsertOrderItems))
    }

    /// Number of expectations not yet consumed.
    pub fn remaining(&self) -> usize {
        self.expectations.lock().unwrap().len()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.remaining();
        if remaining > 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }

    fn builder<R>(
        &self,
        wrap: Box<dyn FnOnce(StoreResult<R>) -> Expectation + Send>,
    ) -> ExpectationBuilder<R> {
        ExpectationBuilder {
            wrap,
            expectations: self.expectations.clone(),
        }
    }

    fn next(&self, call: &str) -> Expectation {
        self.expectations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("Unexpected {call} call: no expectations left"))
    }
}

/// Builder returned by the `expect_*` methods. Finish with `return_ok` or `return_err`.
pub struct ExpectationBuilder<R> {
    wrap: Box<dyn FnOnce(StoreResult<R>) -> Expectation + Send>,
    expectations: Queue,
}

impl<R> ExpectationBuilder<R> {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: R) {
        self.push(Ok(value));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: StoreError) {
        self.push(Err(error));
    }

    fn push(self, response: StoreResult<R>) {
        let expectation = (self.wrap)(response);
        self.expectations.lock().unwrap().push_back(expectation);
    }
}

fn mismatch(call: &str, got: Expectation) -> ! {
    panic!("Expectation mismatch: {call} called but {} was expected", got.name())
}

#[async_trait]
impl OrderStore for MockStore {
    async fn get_orders(&self) -> StoreResult<Vec<Order>> {
        match self.next("get_orders") {
            Expectation::GetOrders(response) => response,
            other => mismatch("get_orders", other),
        }
    }

    async fn get_order_by_uid(&self, order_uid: &str) -> StoreResult<Order> {
        match self.next("get_order_by_uid") {
            Expectation::GetOrderByUid {
                order_uid: expected,
                response,
            } => {
                assert_eq!(order_uid, expected, "get_order_by_uid called with wrong uid");
                response
            }
            other => mismatch("get_order_by_uid", other),
        }
    }

    async fn get_items_by_uid(&self, order_uid: &str) -> StoreResult<Vec<Item>> {
        match self.next("get_items_by_uid") {
            Expectation::GetItemsByUid {
                order_uid: expected,
                response,
            } => {
                assert_eq!(order_uid, expected, "get_items_by_uid called with wrong uid");
                response
            }
            other => mismatch("get_items_by_uid", other),
        }
    }

    async fn get_payment_by_uid(&self, order_uid: &str) -> StoreResult<Payment> {
        match self.next("get_payment_by_uid") {
            Expectation::GetPaymentByUid {
                order_uid: expected,
                response,
            } => {
                assert_eq!(order_uid, expected, "get_payment_by_uid called with wrong uid");
                response
            }
            other => mismatch("get_payment_by_uid", other),
        }
    }

    async fn item_exists(&self, chrt_id: i64) -> StoreResult<bool> {
        match self.next("item_exists") {
            Expectation::ItemExists {
                chrt_id: expected,
                response,
            } => {
                assert_eq!(chrt_id, expected, "item_exists called with wrong chrt_id");
                response
            }
            other => mismatch("item_exists", other),
        }
    }

    async fn insert_order(&self, _order: &Order) -> StoreResult<()> {
        match self.next("insert_order") {
            Expectation::InsertOrder(response) => response,
            other => mismatch("insert_order", other),
        }
    }

    async fn insert_payment(&self, _payment: &Payment) -> StoreResult<()> {
        match self.next("insert_payment") {
            Expectation::InsertPayment(response) => response,
            other => mismatch("insert_payment", other),
        }
    }

    async fn insert_item(&self, _item: &Item) -> StoreResult<()> {
        match self.next("insert_item") {
            Expectation::InsertItem(response) => response,
            other => mismatch("insert_item", other),
        }
    }

    async fn insert_order_items(&self, _order_uid: &str, _chrt_ids: &[i64]) -> StoreResult<()> {
        match self.next("insert_order_items") {
            Expectation::InsertOrderItems(response) => response,
            other => mismatch("insert_order_items", other),
        }
    }
}
