//! # Order Cache Service
//!
//! Wires the production collaborators and runs until Ctrl+C or SIGTERM:
//! 1. Loads [`Config`], sets up tracing and the optional metrics exporter.
//! 2. Connects to Postgres and creates the tables if needed.
//! 3. Connects the configured message bus.
//! 4. Starts the [`OrderService`] (recover, subscribe, serve).

use order_cache::bus::{ChannelBus, MessageBus, NatsBus};
use order_cache::config::{Config, MessagingType};
use order_cache::lifecycle::{setup_metrics, setup_tracing, shutdown_signal, OrderService};
use order_store::{OrderStore, PostgresStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(None)?;
    setup_tracing(config.logging.format);
    setup_metrics(&config.metrics);

    info!(
        bind = %config.server.bind_address(),
        messaging = ?config.messaging.messaging_type,
        subject = %config.messaging.subject,
        "Starting order cache"
    );

    let postgres = PostgresStore::connect(&config.database.postgres()).await?;
    postgres.init().await?;
    let store: Arc<dyn OrderStore> = Arc::new(postgres);

    let bus: Arc<dyn MessageBus> = match config.messaging.messaging_type {
        MessagingType::Nats => Arc::new(NatsBus::connect(&config.messaging.nats()).await?),
        MessagingType::Channel => Arc::new(ChannelBus::new()),
    };

    let service = OrderService::start(&config, store, bus).await?;

    shutdown_signal().await;
    service.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
