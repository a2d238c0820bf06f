//! # Ingestion
//!
//! The only path that mutates persistent state. One bus message in, at most one
//! order written.
//!
//! ```text
//! payload ─► decode ─► dedup gate ─► cache.set ─► persist_order
//!              │           │                          │
//!           rejected   duplicate                accepted / failed
//! ```
//!
//! See [`IngestionPipeline`] for the dedup and failure rules.

pub mod error;
pub mod pipeline;
pub mod stats;

pub use error::{DecodeError, IngestError, PersistError, PersistStage};
pub use pipeline::{decode, disposition, persist_order, IngestOutcome, IngestionPipeline};
pub use stats::{IngestSnapshot, IngestStats};
