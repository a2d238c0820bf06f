//! Process lifecycle: startup ordering, shutdown, logging and metrics setup.

pub mod metrics;
pub mod service;
pub mod tracing;

pub use self::metrics::setup_metrics;
pub use self::service::{shutdown_signal, OrderService, ServiceError, StartupError};
pub use self::tracing::{setup_tracing, LogFormat};
