//! In-memory channel-based message bus.
//!
//! Uses one tokio broadcast channel per subject for pub/sub within a single process.
//! Used for local runs and tests without a NATS server. There is no acknowledgement:
//! a handler's [`Disposition`](super::Disposition) is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Envelope, MessageBus, MessageHandler, Result, Subscription};

/// Default per-subject channel capacity.
const CHANNEL_CAPACITY: usize = 1024;

/// In-process [`MessageBus`] over tokio broadcast channels.
///
/// Every subscriber of a subject receives every message published after it
/// subscribed. Messages published with no subscriber are discarded.
pub struct ChannelBus {
    subjects: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        info!(capacity, "Channel bus initialized");
        Self {
            subjects: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.lock()
            .get(subject)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<Bytes> {
        self.lock()
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Bytes>>> {
        self.subjects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        // Send to channel (ignore error if no receivers)
        match self.sender(subject).send(payload) {
            Ok(receivers) => debug!(subject, receivers, "Published to channel"),
            Err(_) => debug!(subject, "Published to channel (no receivers)"),
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let receiver = self.sender(subject).subscribe();
        let stream_subject = subject.to_string();

        let envelopes = futures::stream::unfold(receiver, move |mut receiver| {
            let subject = stream_subject.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((Envelope::unacked(payload), receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(%subject, skipped, "Channel subscriber lagged, skipped messages");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        info!(
            subject,
            subscribers = self.subscriber_count(subject),
            "Handler subscribed to channel bus"
        );
        Ok(Subscription::spawn(subject, envelopes, handler))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let subjects = std::mem::take(&mut *self.lock());
        info!(subjects = subjects.len(), "Channel bus closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Disposition;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Bytes>);

    impl MessageHandler for Forward {
        fn handle(&self, payload: Bytes) -> BoxFuture<'static, Disposition> {
            let tx = self.0.clone();
            Box::pin(async move {
                let _ = tx.send(payload);
                Disposition::Ack
            })
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = ChannelBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("orders", Arc::new(Forward(tx))).await.unwrap();

        bus.publish("orders", Bytes::from_static(b"hello")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let bus = ChannelBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("orders", Arc::new(Forward(tx))).await.unwrap();

        bus.publish("other", Bytes::from_static(b"x")).await.unwrap();
        bus.publish("orders", Bytes::from_static(b"y")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Bytes::from_static(b"y"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = ChannelBus::new();
        assert!(bus.publish("orders", Bytes::new()).await.is_ok());
        assert_eq!(bus.subscriber_count("orders"), 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_subscriber() {
        let bus = ChannelBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe("orders", Arc::new(Forward(tx))).await.unwrap();
        assert_eq!(bus.subscriber_count("orders"), 1);

        sub.cancel();

        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.subscriber_count("orders") > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("receiver was not released");
    }
}
