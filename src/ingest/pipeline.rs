use crate::bus::{Disposition, MessageHandler};
use crate::cache::OrderCache;
use crate::ingest::error::{DecodeError, IngestError, PersistError, PersistStage};
use crate::ingest::stats::IngestStats;
use bytes::Bytes;
use chrono::SubsecRound;
use futures::future::BoxFuture;
use order_store::{Order, OrderStore, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What happened to a message that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly cached and written to the store.
    Stored,
    /// Already cached. Nothing was written.
    Duplicate,
}

/// Decodes one bus payload into an order.
///
/// Missing fields take their zero value. An empty `payment.transaction` is filled
/// with the order's `order_uid`. `date_created` is truncated to microseconds, the
/// precision the store keeps, so the cached order matches the one recovered later.
pub fn decode(payload: &[u8]) -> Result<Order, DecodeError> {
    let mut order: Order = serde_json::from_slice(payload)?;
    order.date_created = order.date_created.trunc_subsecs(6);

    if order.order_uid.is_empty() {
        return Err(DecodeError::MissingOrderUid);
    }
    if order.payment.transaction.is_empty() {
        order.payment.transaction = order.order_uid.clone();
    } else if order.payment.transaction != order.order_uid {
        return Err(DecodeError::TransactionMismatch {
            order_uid: order.order_uid,
            transaction: order.payment.transaction,
        });
    }
    Ok(order)
}

/// Writes an aggregate: order row, payment, each item not yet stored, then the
/// associations for every item. Stops at the first failure; nothing is undone.
///
/// Items are shared between orders. Another order can store the same item between
/// the existence check and the insert, so a conflict on insert counts as present.
pub async fn persist_order(store: &dyn OrderStore, order: &Order) -> Result<(), PersistError> {
    let failed_at = move |stage: PersistStage| {
        move |source: StoreError| PersistError {
            order_uid: order.order_uid.clone(),
            stage,
            source,
        }
    };

    store
        .insert_order(order)
        .await
        .map_err(failed_at(PersistStage::Order))?;
    store
        .insert_payment(&order.payment)
        .await
        .map_err(failed_at(PersistStage::Payment))?;

    for item in &order.items {
        let exists = store
            .item_exists(item.chrt_id)
            .await
            .map_err(failed_at(PersistStage::ItemLookup))?;
        if exists {
            debug!(chrt_id = item.chrt_id, "Item already stored");
            continue;
        }
        match store.insert_item(item).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                debug!(chrt_id = item.chrt_id, "Item stored concurrently");
            }
            Err(e) => return Err(failed_at(PersistStage::ItemInsert)(e)),
        }
    }

    store
        .insert_order_items(&order.order_uid, &order.chrt_ids())
        .await
        .map_err(failed_at(PersistStage::Associations))?;
    Ok(())
}

/// How the bus should settle a message after [`IngestionPipeline::ingest`].
///
/// Undecodable, duplicate and stored messages are acked. A store failure asks for
/// redelivery: while this process runs the redelivery is dropped at the dedup gate
/// and acked, but after a restart it is ingested again unless recovery already
/// loaded the order.
pub fn disposition(result: &Result<IngestOutcome, IngestError>) -> Disposition {
    match result {
        Ok(_) | Err(IngestError::Decode(_)) => Disposition::Ack,
        Err(IngestError::Persist(_)) => Disposition::Retry,
    }
}

/// Turns bus messages into cached, persisted orders.
///
/// # Dedup gate
///
/// A message whose `order_uid` is already cached is dropped. Otherwise the order is
/// cached *before* the store write starts, so a redelivery arriving mid-write is
/// dropped too. The check and the set are two separate lock acquisitions: two
/// deliveries racing through the gate both reach the store, and the second one
/// fails there with a conflict.
///
/// # Failure
///
/// A failed store write does not remove the cache entry. The order stays readable
/// from the cache while the store holds part of it or none of it, until the next
/// restart rebuilds the cache from the store. Every such case is logged at `error`
/// and counted in [`IngestStats`].
#[derive(Clone)]
pub struct IngestionPipeline {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
    stats: Arc<IngestStats>,
}

impl IngestionPipeline {
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderStore>) -> Self {
        Self {
            cache,
            store,
            stats: Arc::new(IngestStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    /// Processes one message payload. Never retries.
    pub async fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let order = match decode(payload) {
            Ok(order) => order,
            Err(e) => {
                self.stats.record_rejected();
                warn!(error = %e, size = payload.len(), "Dropping undecodable message");
                return Err(e.into());
            }
        };
        let order_uid = order.order_uid.clone();

        if self.cache.contains(&order_uid) {
            self.stats.record_duplicate();
            debug!(%order_uid, "Duplicate order dropped");
            return Ok(IngestOutcome::Duplicate);
        }
        self.cache.set(order_uid.clone(), order.clone());

        match persist_order(self.store.as_ref(), &order).await {
            Ok(()) => {
                self.stats.record_accepted();
                info!(%order_uid, items = order.items.len(), "Order stored");
                Ok(IngestOutcome::Stored)
            }
            Err(e) => {
                self.stats.record_failed();
                error!(
                    %order_uid,
                    stage = %e.stage,
                    error = %e.source,
                    "Order cached but not fully persisted"
                );
                Err(e.into())
            }
        }
    }
}

impl MessageHandler for IngestionPipeline {
    fn handle(&self, payload: Bytes) -> BoxFuture<'static, Disposition> {
        let pipeline = self.clone();
        Box::pin(
            async move {
                // Outcome already logged and counted
                disposition(&pipeline.ingest(&payload).await)
            }
            .instrument(info_span!("ingest")),
        )
    }
}
