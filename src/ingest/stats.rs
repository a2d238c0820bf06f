//! Outcome counters for the ingestion pipeline.
//!
//! Every outcome is counted twice: in process, for [`IngestStats::snapshot`], and as
//! `orders_ingested_total{outcome}` through the `metrics` facade for export.

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals, one per message outcome.
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    /// Cached and fully written to the store.
    pub accepted: u64,
    /// Already cached, dropped at the dedup gate.
    pub duplicates: u64,
    /// Failed to decode.
    pub rejected: u64,
    /// Cached, but the store write failed. The cache is ahead of the store for these.
    pub failed: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        counter!("orders_ingested_total", 1u64, "outcome" => "accepted");
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        counter!("orders_ingested_total", 1u64, "outcome" => "duplicate");
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        counter!("orders_ingested_total", 1u64, "outcome" => "rejected");
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        counter!("orders_ingested_total", 1u64, "outcome" => "failed");
    }
}

impl IngestSnapshot {
    /// Messages seen in total.
    pub fn total(&self) -> u64 {
        self.accepted + self.duplicates + self.rejected + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_outcomes() {
        let stats = IngestStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_duplicate();
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(
            snap,
            IngestSnapshot {
                accepted: 2,
                duplicates: 1,
                rejected: 0,
                failed: 1,
            }
        );
        assert_eq!(snap.total(), 4);
    }

    #[test]
    fn test_outcomes_are_exported() {
        // The only recorder installed in this test binary
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .unwrap();

        let stats = IngestStats::new();
        stats.record_accepted();
        stats.record_rejected();
        stats.record_rejected();

        let rendered = handle.render();
        assert!(rendered.contains(r#"orders_ingested_total{outcome="accepted"}"#));
        // No other unit test rejects a message
        assert!(rendered.contains(r#"orders_ingested_total{outcome="rejected"} 2"#));
    }
}
