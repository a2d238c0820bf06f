//! Prometheus export of the counters recorded through the `metrics` crate.
//!
//! | Metric | Labels | Meaning |
//! |---|---|---|
//! | `orders_ingested_total` | `outcome` = `accepted`, `duplicate`, `rejected`, `failed` | Bus messages by ingestion outcome |

use crate::config::MetricsConfig;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Installs the Prometheus exporter when `metrics.listen` is set. Returns whether an
/// exporter is now serving. Must run inside the tokio runtime.
pub fn setup_metrics(config: &MetricsConfig) -> bool {
    let Some(listen) = config.listen.as_deref() else {
        return false;
    };
    let Ok(addr) = listen.parse::<SocketAddr>() else {
        warn!(listen, "Invalid metrics.listen; expected host:port");
        return false;
    };

    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => {
            info!(%addr, "Prometheus metrics exporter listening");
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to install metrics exporter");
            false
        }
    }
}
