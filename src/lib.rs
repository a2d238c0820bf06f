//! # Order Cache
//!
//! > **Orders in from the bus, orders out over HTTP, with a memory-speed read path.**
//!
//! This crate ingests order messages from a message bus, persists every previously
//! unseen order to an [`OrderStore`](order_store::OrderStore), and answers point
//! lookups by `order_uid` from an in-memory mirror of the store.
//!
//! ## Data Flow
//!
//! ```text
//! Bus ──► IngestionPipeline ──► OrderCache   (optimistic set)
//!                          └──► OrderStore   (order, payment, items, associations)
//!
//! GET /{order_uid} ──► LookupService ──► OrderCache ──(miss)──► OrderStore ──► OrderCache
//! ```
//!
//! ## Module Tour
//!
//! ### 1. The Mirror ([`cache`])
//! [`OrderCache`](cache::OrderCache) holds every known order behind a reader/writer
//! lock. It is rebuilt from the store once at startup and never evicts.
//!
//! ### 2. The Write Path ([`ingest`])
//! [`IngestionPipeline`](ingest::IngestionPipeline) decodes a message, drops it if the
//! order is already cached, otherwise caches it and writes it through to the store.
//! Outcomes are counted in [`IngestStats`](ingest::IngestStats).
//!
//! ### 3. The Read Path ([`lookup`], [`http`])
//! [`LookupService`](lookup::LookupService) is cache-aside over the store. The
//! [`http`] module exposes it as `GET /{order_uid}`.
//!
//! ### 4. The Plumbing ([`bus`], [`config`], [`lifecycle`])
//! - [`bus`]: the [`MessageBus`](bus::MessageBus) trait with NATS JetStream and in-process backends.
//! - [`config`]: layered file + environment configuration.
//! - [`lifecycle`]: the [`OrderService`](lifecycle::OrderService) supervisor and tracing setup.
//!
//! ## Running
//!
//! ```bash
//! ORDER_CACHE__DATABASE__URL=postgres://localhost/orders RUST_LOG=info cargo run --bin order-cache
//! cargo run --bin order-producer -- --dir demos/orders
//! ```

pub mod bus;
pub mod cache;
pub mod config;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod lookup;
