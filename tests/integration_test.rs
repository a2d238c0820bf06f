use bytes::Bytes;
use order_cache::bus::{ChannelBus, MessageBus};
use order_cache::config::Config;
use order_cache::lifecycle::{OrderService, StartupError};
use order_store::{MemoryStore, MockStore, Order, OrderStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

const SUBJECT: &str = "orders";

fn sample_order(uid: &str) -> Order {
    let mut order: Order =
        serde_json::from_str(include_str!("../demos/orders/model.json")).unwrap();
    order.order_uid = uid.to_string();
    order.payment.transaction = uid.to_string();
    order
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Full end-to-end test: bus in, HTTP out, with real collaborators.
#[tokio::test]
async fn test_published_order_is_served_over_http() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(ChannelBus::new());
    let service = OrderService::start(&Config::for_test(), store.clone(), bus.clone())
        .await
        .expect("Failed to start service");
    let base = format!("http://{}", service.local_addr());

    let o1 = sample_order("o1");
    bus.publish(SUBJECT, Bytes::from(serde_json::to_vec(&o1).unwrap()))
        .await
        .unwrap();

    let cache = service.cache();
    wait_until(|| cache.contains("o1")).await;
    wait_until(|| service.stats().accepted == 1).await;
    assert_eq!(store.get_order_by_uid("o1").await.unwrap(), o1);

    let response = reqwest::get(format!("{base}/o1")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Order = response.json().await.unwrap();
    assert_eq!(body, o1);

    let response = reqwest::get(format!("{base}/o2")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "Order not found");

    service.shutdown().await.expect("Shutdown failed");
    assert_eq!(bus.subscriber_count(SUBJECT), 0);
}

#[tokio::test]
async fn test_redelivered_message_is_ingested_once() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(ChannelBus::new());
    let service = OrderService::start(&Config::for_test(), store.clone(), bus.clone())
        .await
        .unwrap();

    let message = Bytes::from(serde_json::to_vec(&sample_order("o1")).unwrap());
    for _ in 0..3 {
        bus.publish(SUBJECT, message.clone()).await.unwrap();
    }

    wait_until(|| {
        let stats = service.stats();
        stats.accepted + stats.duplicates + stats.failed == 3
    })
    .await;
    assert_eq!(store.order_count(), 1);
    assert_eq!(service.stats().accepted, 1);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_recovers_every_stored_order() {
    let stored = vec![sample_order("o1"), sample_order("o2"), sample_order("o3")];
    let store = Arc::new(MemoryStore::seeded(stored.clone()));
    let bus = Arc::new(ChannelBus::new());

    let service = OrderService::start(&Config::for_test(), store, bus)
        .await
        .unwrap();

    let cache = service.cache();
    assert_eq!(cache.len(), 3);
    for order in &stored {
        assert_eq!(cache.get(&order.order_uid).as_ref(), Some(order));
    }

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_recovery_failure_aborts_startup() {
    let store = Arc::new(MockStore::new());
    store
        .expect_get_orders()
        .return_err(StoreError::Backend("connection refused".to_string()));
    let bus = Arc::new(ChannelBus::new());

    let result = OrderService::start(&Config::for_test(), store.clone(), bus.clone()).await;

    assert!(matches!(result, Err(StartupError::Recovery(_))));
    assert_eq!(bus.subscriber_count(SUBJECT), 0);
    store.verify();
}

#[tokio::test]
async fn test_bind_failure_releases_subscription() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = Config::for_test();
    config.server.port = taken.local_addr().unwrap().port();
    let bus = Arc::new(ChannelBus::new());

    let result = OrderService::start(&config, Arc::new(MemoryStore::new()), bus.clone()).await;

    assert!(matches!(result, Err(StartupError::Bind { .. })));
    wait_until(|| bus.subscriber_count(SUBJECT) == 0).await;
}
