//! Error types for the ingestion pipeline.

use order_store::StoreError;
use std::fmt;
use thiserror::Error;

/// A message that cannot become an order. The message is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a JSON order.
    #[error("Malformed order payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded but carries no identifier to key it by.
    #[error("Order has no order_uid")]
    MissingOrderUid,

    /// The payment would be stored under a different key than its order.
    #[error("Payment transaction {transaction} does not match order {order_uid}")]
    TransactionMismatch {
        order_uid: String,
        transaction: String,
    },
}

/// Step of the write sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Order,
    Payment,
    ItemLookup,
    ItemInsert,
    Associations,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistStage::Order => "order",
            PersistStage::Payment => "payment",
            PersistStage::ItemLookup => "item_lookup",
            PersistStage::ItemInsert => "item_insert",
            PersistStage::Associations => "associations",
        };
        f.write_str(name)
    }
}

/// A store write failed partway through an aggregate. Rows written by earlier
/// stages stay in place.
#[derive(Debug, Error)]
#[error("Persisting order {order_uid} failed at {stage}: {source}")]
pub struct PersistError {
    pub order_uid: String,
    pub stage: PersistStage,
    #[source]
    pub source: StoreError,
}

/// Errors that can occur while ingesting one message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The order is cached but the store does not hold all of it.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl IngestError {
    pub fn order_uid(&self) -> Option<&str> {
        match self {
            IngestError::Decode(_) => None,
            IngestError::Persist(e) => Some(&e.order_uid),
        }
    }
}
