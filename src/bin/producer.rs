//! # Order Producer
//!
//! Publishes sample orders to the bus, one file per message.
//!
//! ```bash
//! order-producer --dir demos/orders
//! order-producer --dir demos/orders --url nats://nats:4222 --subject orders --interval-ms 500
//! ```
//!
//! Every `*.json` file in the directory is checked to decode as an order before it
//! is published. Files that do not decode are skipped. Each publish waits for the
//! JetStream ack, so a finished run means every order is in the stream.

use bytes::Bytes;
use clap::Parser;
use order_cache::bus::nats::NatsConfig;
use order_cache::bus::{MessageBus, NatsBus};
use order_cache::config::MessagingConfig;
use order_cache::ingest::decode;
use order_cache::lifecycle::{setup_tracing, LogFormat};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "order-producer")]
#[command(author, version, about = "Publish sample orders to the order cache bus")]
struct Cli {
    /// Directory holding one JSON order per file
    #[arg(short, long, default_value = "demos/orders")]
    dir: PathBuf,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    url: String,

    /// Subject to publish to
    #[arg(short, long, env = "NATS_SUBJECT", default_value = "orders")]
    subject: String,

    /// Pause between messages, in milliseconds
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// JetStream stream capturing the subject; created if missing
    #[arg(long, env = "NATS_STREAM", default_value = "ORDERS")]
    stream: String,

    #[arg(long, default_value = "order-producer")]
    client_name: String,
}

fn order_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing(LogFormat::Compact);
    let cli = Cli::parse();

    let files = order_files(&cli.dir)?;
    info!(dir = %cli.dir.display(), files = files.len(), "Loaded order files");

    let bus = NatsBus::connect(&NatsConfig {
        url: cli.url.clone(),
        client_name: cli.client_name.clone(),
        stream: cli.stream.clone(),
        ..MessagingConfig::default().nats()
    })
    .await?;

    let interval = Duration::from_millis(cli.interval_ms);
    let mut published = 0usize;
    for (i, path) in files.iter().enumerate() {
        let payload = std::fs::read(path)?;
        let order = match decode(&payload) {
            Ok(order) => order,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping file");
                continue;
            }
        };

        bus.publish(&cli.subject, Bytes::from(payload)).await?;
        published += 1;
        info!(order_uid = %order.order_uid, subject = %cli.subject, "Order published");

        if i + 1 < files.len() {
            tokio::time::sleep(interval).await;
        }
    }

    bus.flush().await?;
    bus.close().await?;
    info!(published, "Producer finished");
    Ok(())
}
