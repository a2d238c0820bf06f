//! Message bus for order delivery.
//!
//! This module contains:
//! - `MessageBus` trait: publish raw payloads to a subject, subscribe handlers to it
//! - `MessageHandler` trait: processes one delivered payload
//! - `Subscription`: the dispatch task behind one `subscribe` call
//! - Implementations: NATS (`NatsBus`) and in-process broadcast channels (`ChannelBus`)
//!
//! Delivery is at-least-once from the consumer's point of view and unordered across
//! messages: every payload is handed to its own tokio task, so handlers for different
//! messages overlap. Each handler reports a [`Disposition`], which backends with
//! acknowledgements pass back to the server once the handler has finished.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod channel;
pub mod nats;

pub use channel::ChannelBus;
pub use nats::NatsBus;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Close failed: {0}")]
    Close(String),
}

/// How a handled message is settled with the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with the message. It is not delivered again.
    Ack,
    /// Ask the bus to deliver the message again.
    Retry,
}

/// Handler for processing messages from the bus.
///
/// The returned future owns everything it needs. The bus spawns it and settles the
/// message with whatever it resolves to.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, payload: Bytes) -> BoxFuture<'static, Disposition>;
}

/// Subject-based publish/subscribe transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Starts delivering every message on `subject` to `handler` until the returned
    /// [`Subscription`] is cancelled or dropped.
    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    /// Waits until everything published so far has left the process.
    async fn flush(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Subscription
// ============================================================================

/// Reports a handler's [`Disposition`] back to the backend that delivered the message.
pub(crate) type Settle = Box<dyn FnOnce(Disposition) -> BoxFuture<'static, ()> + Send>;

/// One message as yielded by a backend's delivery stream.
pub(crate) struct Envelope {
    payload: Bytes,
    settle: Option<Settle>,
}

impl Envelope {
    /// A message from a backend without acknowledgements.
    pub(crate) fn unacked(payload: Bytes) -> Self {
        Self {
            payload,
            settle: None,
        }
    }

    pub(crate) fn with_settle(payload: Bytes, settle: Settle) -> Self {
        Self {
            payload,
            settle: Some(settle),
        }
    }
}

/// An active subscription. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Spawns the dispatch loop: one task per message yielded by `stream`. The task
    /// runs the handler, then settles the message if the backend asked for it.
    pub(crate) fn spawn<S>(subject: &str, stream: S, handler: Arc<dyn MessageHandler>) -> Self
    where
        S: Stream<Item = Envelope> + Send + 'static,
    {
        let task_subject = subject.to_string();
        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(Envelope { payload, settle }) = stream.next().await {
                debug!(subject = %task_subject, size = payload.len(), "Message received");
                let handled = handler.handle(payload);
                tokio::spawn(async move {
                    let disposition = handled.await;
                    if let Some(settle) = settle {
                        settle(disposition).await;
                    }
                });
            }
            info!(subject = %task_subject, "Subscription stream ended");
        });

        Self {
            subject: subject.to_string(),
            task,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Whether the dispatch loop is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops delivery. Handlers already spawned run to completion.
    pub fn cancel(self) {
        info!(subject = %self.subject, "Subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting(Arc<AtomicUsize>);

    impl MessageHandler for Counting {
        fn handle(&self, payload: Bytes) -> BoxFuture<'static, Disposition> {
            let count = self.0.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                if payload.is_empty() {
                    Disposition::Retry
                } else {
                    Disposition::Ack
                }
            })
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_subscription_dispatches_every_payload() {
        let count = Arc::new(AtomicUsize::new(0));
        let payloads = futures::stream::iter(vec![
            Envelope::unacked(Bytes::from("a")),
            Envelope::unacked(Bytes::from("b")),
        ]);

        let sub = Subscription::spawn("orders", payloads, Arc::new(Counting(count.clone())));
        assert_eq!(sub.subject(), "orders");

        wait_for(|| count.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test]
    async fn test_settle_receives_handler_disposition() {
        let (settled_tx, mut settled_rx) = mpsc::unbounded::<Disposition>();
        let envelope = |payload: &'static [u8]| {
            let settled_tx = settled_tx.clone();
            Envelope::with_settle(
                Bytes::from_static(payload),
                Box::new(move |disposition: Disposition| {
                    async move {
                        let _ = settled_tx.unbounded_send(disposition);
                    }
                    .boxed()
                }),
            )
        };
        let payloads = futures::stream::iter(vec![envelope(b"order"), envelope(b"")]);
        let count = Arc::new(AtomicUsize::new(0));

        let _sub = Subscription::spawn("orders", payloads, Arc::new(Counting(count)));

        let mut settled = Vec::new();
        for _ in 0..2 {
            let disposition = tokio::time::timeout(Duration::from_secs(1), settled_rx.next())
                .await
                .expect("message was not settled")
                .expect("settle channel closed");
            settled.push(disposition);
        }
        assert!(settled.contains(&Disposition::Ack));
        assert!(settled.contains(&Disposition::Retry));
    }

    #[tokio::test]
    async fn test_cancel_stops_dispatch_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded::<Envelope>();
        let sub = Subscription::spawn("orders", rx, Arc::new(Counting(count.clone())));
        assert!(sub.is_active());

        assert!(tx
            .unbounded_send(Envelope::unacked(Bytes::from("before")))
            .is_ok());
        wait_for(|| count.load(Ordering::SeqCst) == 1).await;

        sub.cancel();

        // The aborted loop drops its end of the stream
        wait_for(|| tx.is_closed()).await;
        assert!(tx
            .unbounded_send(Envelope::unacked(Bytes::from("after")))
            .is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
