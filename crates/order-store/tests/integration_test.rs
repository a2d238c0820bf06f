use order_store::{Delivery, Item, MemoryStore, MockStore, Order, OrderStore, Payment, StoreError};
use std::sync::Arc;
use std::time::Duration;

// --- Fixtures ---

fn item(chrt_id: i64) -> Item {
    Item {
        chrt_id,
        track_number: "WBILMTESTTRACK".to_string(),
        price: 453,
        rid: format!("ab4219087a764ae0b{chrt_id}"),
        name: "Mascaras".to_string(),
        sale: 30,
        size: "0".to_string(),
        total_price: 317,
        nm_id: 2389212,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}

fn order(uid: &str, chrt_ids: &[i64]) -> Order {
    Order {
        order_uid: uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: uid.to_string(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            ..Payment::default()
        },
        items: chrt_ids.iter().copied().map(item).collect(),
        locale: "en".to_string(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        oof_shard: "1".to_string(),
        ..Order::default()
    }
}

/// Writes an aggregate the way the ingestion path does.
async fn persist(store: &dyn OrderStore, order: &Order) -> Result<(), StoreError> {
    store.insert_order(order).await?;
    store.insert_payment(&order.payment).await?;
    for item in &order.items {
        if !store.item_exists(item.chrt_id).await? {
            store.insert_item(item).await?;
        }
    }
    store
        .insert_order_items(&order.order_uid, &order.chrt_ids())
        .await
}

// --- Tests ---

#[tokio::test]
async fn test_full_aggregate_round_trips_through_store() {
    let store = MemoryStore::new();
    let o = order("b563feb7b2b84b6test", &[9934930, 9934931]);

    persist(&store, &o).await.expect("persist failed");

    let loaded = store
        .get_order_by_uid("b563feb7b2b84b6test")
        .await
        .expect("order not found");
    assert_eq!(loaded, o);
    assert_eq!(
        store.get_payment_by_uid("b563feb7b2b84b6test").await.unwrap(),
        o.payment
    );
    assert_eq!(store.get_items_by_uid("b563feb7b2b84b6test").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_items_are_shared_between_orders() {
    let store = MemoryStore::new();
    persist(&store, &order("o1", &[1, 2])).await.unwrap();
    persist(&store, &order("o2", &[2, 3])).await.unwrap();

    assert_eq!(store.item_count(), 3);
    assert_eq!(store.association_count(), 4);

    let o2 = store.get_order_by_uid("o2").await.unwrap();
    let ids: Vec<i64> = o2.items.iter().map(|i| i.chrt_id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn test_repeated_chrt_id_within_order_stored_once() {
    let store = MemoryStore::new();
    let o = order("o1", &[5, 5]);
    persist(&store, &o).await.unwrap();

    assert_eq!(store.item_count(), 1);
    assert_eq!(store.association_count(), 1);
}

#[tokio::test]
async fn test_get_orders_returns_every_complete_order() {
    let store = MemoryStore::new();
    persist(&store, &order("o1", &[1])).await.unwrap();
    persist(&store, &order("o2", &[])).await.unwrap();
    // Order row only, payment never written
    store.insert_order(&order("o3", &[])).await.unwrap();

    let all = store.get_orders().await.unwrap();
    let uids: Vec<&str> = all.iter().map(|o| o.order_uid.as_str()).collect();
    assert_eq!(uids, vec!["o1", "o2"]);
    assert_eq!(store.order_count(), 3);
}

#[tokio::test]
async fn test_second_persist_of_same_order_conflicts() {
    let store = MemoryStore::new();
    let o = order("o1", &[1]);
    persist(&store, &o).await.unwrap();

    let err = persist(&store, &o).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(store.insert_order_calls(), 2);
    assert_eq!(store.order_count(), 1);
}

#[tokio::test]
async fn test_store_usable_as_shared_trait_object() {
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::seeded(vec![order("o1", &[1])]));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_order_by_uid("o1").await })
        })
        .collect();

    for handle in handles {
        let loaded = handle.await.unwrap().unwrap();
        assert_eq!(loaded.order_uid, "o1");
    }
}

#[tokio::test]
async fn test_mock_scripts_failure_midway_through_write() {
    let mock = MockStore::new();
    let o = order("o1", &[1]);

    mock.expect_insert_order().return_ok(());
    mock.expect_insert_payment().return_ok(());
    mock.expect_item_exists(1)
        .return_err(StoreError::Timeout(Duration::from_secs(5)));

    let err = persist(&mock, &o).await.unwrap_err();
    assert!(matches!(err, StoreError::Timeout(_)));
    mock.verify();
}
