use crate::bus::{BusError, MessageBus, Subscription};
use crate::cache::OrderCache;
use crate::config::Config;
use crate::http;
use crate::ingest::{IngestSnapshot, IngestStats, IngestionPipeline};
use crate::lookup::LookupService;
use order_store::{OrderStore, StoreError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors that prevent the service from coming up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The cache could not be rebuilt. Nothing was attached.
    #[error("Cache recovery failed: {0}")]
    Recovery(#[source] StoreError),

    #[error("Bus subscription failed: {0}")]
    Subscribe(#[source] BusError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by [`OrderService::shutdown`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP server failed: {0}")]
    Server(#[source] std::io::Error),

    #[error("HTTP server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Closing bus failed: {0}")]
    Bus(#[from] BusError),
}

/// The running service: a recovered cache, an ingestion subscription and an HTTP
/// server, all sharing one [`OrderCache`].
///
/// # Example
///
/// ```ignore
/// let service = OrderService::start(&config, store, bus).await?;
/// shutdown_signal().await;
/// service.shutdown().await?;
/// ```
pub struct OrderService {
    cache: Arc<OrderCache>,
    stats: Arc<IngestStats>,
    bus: Arc<dyn MessageBus>,

    /// Dispatch loop feeding the ingestion pipeline
    subscription: Subscription,

    local_addr: SocketAddr,
    server: JoinHandle<std::io::Result<()>>,
    stop_server: oneshot::Sender<()>,
    shutdown_grace: Duration,
}

impl OrderService {
    /// Brings the service up.
    ///
    /// 1. Rebuilds the cache from `store`. A failure here returns before anything
    ///    else is attached.
    /// 2. Subscribes the ingestion pipeline to `messaging.subject`.
    /// 3. Binds the HTTP listener and starts serving lookups.
    pub async fn start(
        config: &Config,
        store: Arc<dyn OrderStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, StartupError> {
        // =====================================================================
        // Step 1: Recover
        // =====================================================================

        let cache = Arc::new(OrderCache::new());
        cache
            .recover(store.as_ref())
            .await
            .map_err(StartupError::Recovery)?;

        // =====================================================================
        // Step 2: Attach ingestion
        // =====================================================================

        let pipeline = IngestionPipeline::new(cache.clone(), store.clone());
        let stats = pipeline.stats();
        let subscription = bus
            .subscribe(&config.messaging.subject, Arc::new(pipeline))
            .await
            .map_err(StartupError::Subscribe)?;

        // =====================================================================
        // Step 3: Serve lookups
        // =====================================================================

        let addr = config.server.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartupError::Bind { addr, source })?;

        let app = http::router(LookupService::new(cache.clone(), store));
        let (stop_server, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
        });
        info!(addr = %local_addr, "HTTP server listening");

        Ok(Self {
            cache,
            stats,
            bus,
            subscription,
            local_addr,
            server,
            stop_server,
            shutdown_grace: config.server.shutdown_grace(),
        })
    }

    /// The address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn cache(&self) -> Arc<OrderCache> {
        self.cache.clone()
    }

    pub fn stats(&self) -> IngestSnapshot {
        self.stats.snapshot()
    }

    /// Gracefully shuts the service down.
    ///
    /// 1. Stops accepting connections and gives in-flight requests the configured
    ///    grace period, then aborts the server.
    /// 2. Cancels the bus subscription. Ingestion handlers already running are not
    ///    awaited.
    /// 3. Closes the bus.
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        info!("Shutting down service...");

        let _ = self.stop_server.send(());
        let mut server = self.server;
        let server_result = match tokio::time::timeout(self.shutdown_grace, &mut server).await {
            Ok(Ok(served)) => served.map_err(ServiceError::Server),
            Ok(Err(join)) => Err(ServiceError::Join(join)),
            Err(_) => {
                warn!(grace = ?self.shutdown_grace, "In-flight requests did not finish, aborting");
                server.abort();
                Ok(())
            }
        };
        if let Err(e) = &server_result {
            error!(error = %e, "HTTP server stopped with an error");
        }

        self.subscription.cancel();
        let bus_result = self.bus.close().await.map_err(ServiceError::from);

        let stats = self.stats.snapshot();
        info!(
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            rejected = stats.rejected,
            failed = stats.failed,
            "Service shutdown complete."
        );
        server_result.and(bus_result)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
