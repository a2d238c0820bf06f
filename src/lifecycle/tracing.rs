//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging with the `tracing` crate. Call it
//! once, at the top of a binary.
//!
//! ## Configuration
//!
//! - **Levels** come from `RUST_LOG`, falling back to `info`.
//! - **Format** is `compact` (default, one short line per event, no module path) or
//!   `json` (one object per line, for log shippers), chosen by `logging.format`.
//!
//! ```bash
//! RUST_LOG=info cargo run --bin order-cache
//!
//! # Cache hits/misses, duplicate drops, store row counts
//! RUST_LOG=debug cargo run --bin order-cache
//!
//! # Quiet everything but ingestion
//! RUST_LOG=warn,order_cache::ingest=debug cargo run --bin order-cache
//! ```
//!
//! ## What Gets Traced
//!
//! - **Startup**: recovered order count, bound address, bus subscription
//! - **Ingestion**: `Order stored` with `order_uid` and item count; decode drops at
//!   `warn`; a cached order whose store write failed at `error` with `stage`
//! - **Lookups**: cache hit/miss at `debug`, store failures at `error`
//! - **HTTP**: one span per request from `TraceLayer`
//!
//! ## Workflow Trace Example
//!
//! **With `RUST_LOG=info`** (compact):
//!
//! ```text
//! INFO Cache recovered from store recovered=3 size=3
//! INFO Handler subscribed to channel bus subject="orders" subscribers=1
//! INFO HTTP server listening addr=127.0.0.1:8080
//! INFO ingest: Order stored order_uid=b563feb7b2b84b6test items=1
//! ERROR ingest: Order cached but not fully persisted order_uid=o9 stage=payment error=Store operation timed out after 5s
//! ```

use serde::Deserialize;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

pub fn setup_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false); // Module paths add noise; fields carry the context

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}
