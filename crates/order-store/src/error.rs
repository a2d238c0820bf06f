//! # Store Errors
//!
//! One error type for every backend, so callers can tell "no such order" apart from
//! an unreachable or misbehaving database without knowing which backend is in use.

use std::time::Duration;

/// Result alias used by every [`OrderStore`](crate::OrderStore) operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing orders.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No order (with its payment) exists under the identifier.
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    /// A row with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    /// A stored row could not be turned back into the model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is the "absent" condition rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Corrupt(format!("column {index}: {source}"))
            }
            other => StoreError::Database(other),
        }
    }
}
