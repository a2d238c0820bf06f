//! NATS JetStream message bus.
//!
//! Messages are published into a JetStream stream and consumed through a durable
//! pull consumer with explicit acknowledgement. A message stays in the stream until
//! a delivery of it is acked: messages published while the service is down are
//! delivered once it is back, and an unacked delivery is redelivered after
//! `ack_wait`, at most `max_deliver` times. Service instances sharing the same
//! durable name split the messages between them.
//!
//! # Configuration
//!
//! ```yaml
//! messaging:
//!   type: nats
//!   url: "nats://localhost:4222"
//!   subject: "orders"
//!   client_name: "order-cache"
//!   stream: "ORDERS"
//!   durable: "order-cache"
//!   ack_wait_secs: 30
//!   max_deliver: 5
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull::Config as ConsumerConfig, AckPolicy},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, Context,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use tracing::{debug, info, warn};

use super::{BusError, Disposition, Envelope, MessageBus, MessageHandler, Result, Subscription};

/// Connection settings for [`NatsBus`].
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub client_name: String,
    /// JetStream stream holding published orders.
    pub stream: String,
    /// Durable consumer name. Instances using the same name share the work.
    pub durable: String,
    /// How long the server waits for an ack before redelivering.
    pub ack_wait: Duration,
    /// Deliveries per message before the server gives up on it.
    pub max_deliver: i64,
}

/// [`MessageBus`] backed by NATS JetStream.
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: Context,
    config: NatsConfig,
    /// Subjects already known to be captured by the stream.
    bound_subjects: Mutex<HashSet<String>>,
}

impl NatsBus {
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connect(config.url.as_str())
            .await
            .map_err(|e| BusError::Connection(format!("{}: {e}", config.url)))?;

        info!(
            url = %config.url,
            client_name = %config.client_name,
            stream = %config.stream,
            durable = %config.durable,
            "Connected to NATS"
        );

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            config: config.clone(),
            bound_subjects: Mutex::new(HashSet::new()),
        })
    }

    /// Gets the stream, creating it to capture `subject` if it does not exist yet.
    async fn ensure_stream(&self, subject: &str) -> Result<jetstream::stream::Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(StreamConfig {
                name: self.config.stream.clone(),
                subjects: vec![subject.to_string()],
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connection(format!("stream {}: {e}", self.config.stream)))?;

        let newly_bound = self
            .bound_subjects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject.to_string());
        if newly_bound {
            debug!(stream = %self.config.stream, subject, "JetStream stream ready");
        }
        Ok(stream)
    }

    fn is_bound(&self, subject: &str) -> bool {
        self.bound_subjects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(subject)
    }
}

/// Wraps a delivered message so its handler's disposition is sent back as an ack
/// or a nak.
fn envelope(message: jetstream::Message) -> Envelope {
    let payload = message.payload.clone();
    Envelope::with_settle(
        payload,
        Box::new(move |disposition: Disposition| {
            async move {
                let settled = match disposition {
                    Disposition::Ack => message.ack().await,
                    Disposition::Retry => message.ack_with(AckKind::Nak(None)).await,
                };
                if let Err(e) = settled {
                    warn!(?disposition, error = %e, "Failed to settle JetStream message");
                }
            }
            .boxed()
        }),
    )
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        if !self.is_bound(subject) {
            self.ensure_stream(subject).await?;
        }

        let size = payload.len();
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(format!("publish ack: {e}")))?;
        debug!(subject, size, stream = %ack.stream, sequence = ack.sequence, "Published to JetStream");
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let stream = self.ensure_stream(subject).await?;
        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable,
                ConsumerConfig {
                    durable_name: Some(self.config.durable.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    max_deliver: self.config.max_deliver,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("consumer {}: {e}", self.config.durable)))?;
        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(
            subject,
            stream = %self.config.stream,
            durable = %self.config.durable,
            "Subscribed to JetStream consumer"
        );
        let envelopes = messages.filter_map(|delivered| async move {
            match delivered {
                Ok(message) => Some(envelope(message)),
                Err(e) => {
                    warn!(error = %e, "JetStream delivery failed");
                    None
                }
            }
        });
        Ok(Subscription::spawn(subject, envelopes, handler))
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;
        info!("NATS connection flushed");
        Ok(())
    }
}
