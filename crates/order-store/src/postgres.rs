//! PostgreSQL OrderStore implementation.
//!
//! # Tables
//!
//! - `orders` - one row per order, delivery kept as a JSONB document
//! - `payments` - keyed by `transaction` (the order's `order_uid`)
//! - `items` - keyed by `chrt_id`, shared by every order that references it
//! - `order_items` - the order/item association
//!
//! Every statement runs under [`PostgresConfig::statement_timeout`]. When it expires
//! the call fails with [`StoreError::Timeout`]; the statement itself is abandoned.

use crate::error::{StoreError, StoreResult};
use crate::model::{Delivery, Item, Order, Payment};
use crate::store::OrderStore;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_uid TEXT PRIMARY KEY,
    track_number TEXT NOT NULL,
    entry TEXT NOT NULL,
    delivery JSONB NOT NULL,
    locale TEXT NOT NULL,
    internal_signature TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    delivery_service TEXT NOT NULL,
    shardkey TEXT NOT NULL,
    sm_id INTEGER NOT NULL,
    date_created TIMESTAMPTZ NOT NULL,
    oof_shard TEXT NOT NULL
)"#;

const CREATE_PAYMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    "transaction" TEXT PRIMARY KEY REFERENCES orders(order_uid),
    request_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    provider TEXT NOT NULL,
    amount BIGINT NOT NULL,
    payment_dt BIGINT NOT NULL,
    bank TEXT NOT NULL,
    delivery_cost BIGINT NOT NULL,
    goods_total BIGINT NOT NULL,
    custom_fee BIGINT NOT NULL
)"#;

const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    chrt_id BIGINT PRIMARY KEY,
    track_number TEXT NOT NULL,
    price BIGINT NOT NULL,
    rid TEXT NOT NULL,
    name TEXT NOT NULL,
    sale INTEGER NOT NULL,
    size TEXT NOT NULL,
    total_price BIGINT NOT NULL,
    nm_id BIGINT NOT NULL,
    brand TEXT NOT NULL,
    status INTEGER NOT NULL
)"#;

const CREATE_ORDER_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS order_items (
    order_uid TEXT NOT NULL REFERENCES orders(order_uid),
    chrt_id BIGINT NOT NULL REFERENCES items(chrt_id),
    PRIMARY KEY (order_uid, chrt_id)
)"#;

const ORDER_COLUMNS: &str = r#"o.order_uid, o.track_number, o.entry, o.delivery, o.locale,
    o.internal_signature, o.customer_id, o.delivery_service, o.shardkey, o.sm_id,
    o.date_created, o.oof_shard,
    p."transaction", p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
    p.bank, p.delivery_cost, p.goods_total, p.custom_fee"#;

const ITEM_COLUMNS: &str = "i.chrt_id, i.track_number, i.price, i.rid, i.name, i.sale, \
    i.size, i.total_price, i.nm_id, i.brand, i.status";

/// Connection and timeout settings for [`PostgresStore`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

/// PostgreSQL implementation of [`OrderStore`].
pub struct PostgresStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Create a pool from `config` and wrap it.
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );
        Ok(Self::new(pool, config.statement_timeout))
    }

    /// Create the tables if they do not exist yet.
    pub async fn init(&self) -> StoreResult<()> {
        for ddl in [
            CREATE_ORDERS_TABLE,
            CREATE_PAYMENTS_TABLE,
            CREATE_ITEMS_TABLE,
            CREATE_ORDER_ITEMS_TABLE,
        ] {
            self.bounded(sqlx::query(ddl).execute(&self.pool)).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    let delivery: Json<Delivery> = row.try_get("delivery")?;
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: delivery.0,
        payment: payment_from_row(row)?,
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_orders(&self) -> StoreResult<Vec<Order>> {
        let order_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             JOIN payments p ON p.\"transaction\" = o.order_uid \
             ORDER BY o.date_created, o.order_uid"
        );
        let item_sql = format!(
            "SELECT oi.order_uid, {ITEM_COLUMNS} FROM order_items oi \
             JOIN items i ON i.chrt_id = oi.chrt_id"
        );

        let order_rows = self
            .bounded(sqlx::query(&order_sql).fetch_all(&self.pool))
            .await?;
        let item_rows = self
            .bounded(sqlx::query(&item_sql).fetch_all(&self.pool))
            .await?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &item_rows {
            let order_uid: String = row.try_get("order_uid")?;
            items_by_order
                .entry(order_uid)
                .or_default()
                .push(item_from_row(row)?);
        }

        let mut orders = Vec::with_capacity(order_rows.len());
        for row in &order_rows {
            let mut order = order_from_row(row)?;
            order.items = items_by_order.remove(&order.order_uid).unwrap_or_default();
            orders.push(order);
        }
        debug!(size = orders.len(), "Loaded all orders");
        Ok(orders)
    }

    async fn get_order_by_uid(&self, order_uid: &str) -> StoreResult<Order> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             JOIN payments p ON p.\"transaction\" = o.order_uid \
             WHERE o.order_uid = $1"
        );
        let row = self
            .bounded(sqlx::query(&sql).bind(order_uid).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let mut order = order_from_row(&row)?;
        order.items = self.get_items_by_uid(order_uid).await?;
        Ok(order)
    }

    async fn get_items_by_uid(&self, order_uid: &str) -> StoreResult<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items oi \
             JOIN items i ON i.chrt_id = oi.chrt_id \
             WHERE oi.order_uid = $1"
        );
        let rows = self
            .bounded(sqlx::query(&sql).bind(order_uid).fetch_all(&self.pool))
            .await?;
        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn get_payment_by_uid(&self, order_uid: &str) -> StoreResult<Payment> {
        let row = self
            .bounded(
                sqlx::query(
                    "SELECT \"transaction\", request_id, currency, provider, amount, payment_dt, \
                     bank, delivery_cost, goods_total, custom_fee \
                     FROM payments WHERE \"transaction\" = $1",
                )
                .bind(order_uid)
                .fetch_optional(&self.pool),
            )
            .await?
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;
        Ok(payment_from_row(&row)?)
    }

    async fn item_exists(&self, chrt_id: i64) -> StoreResult<bool> {
        let row = self
            .bounded(
                sqlx::query("SELECT EXISTS (SELECT 1 FROM items WHERE chrt_id = $1) AS present")
                    .bind(chrt_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.try_get("present")?)
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                "INSERT INTO orders (order_uid, track_number, entry, delivery, locale, \
                 internal_signature, customer_id, delivery_service, shardkey, sm_id, \
                 date_created, oof_shard) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(Json(&order.delivery))
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                "INSERT INTO payments (\"transaction\", request_id, currency, provider, amount, \
                 payment_dt, bank, delivery_cost, goods_total, custom_fee) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn insert_item(&self, item: &Item) -> StoreResult<()> {
        let result = self.bounded(
            sqlx::query(
                "INSERT INTO items (chrt_id, track_number, price, rid, name, sale, size, \
                 total_price, nm_id, brand, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (chrt_id) DO NOTHING",
            )
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            debug!(chrt_id = item.chrt_id, "Item already stored, left unchanged");
        }
        Ok(())
    }

    async fn insert_order_items(&self, order_uid: &str, chrt_ids: &[i64]) -> StoreResult<()> {
        if chrt_ids.is_empty() {
            return Ok(());
        }
        self.bounded(
            sqlx::query(
                "INSERT INTO order_items (order_uid, chrt_id) \
                 SELECT $1, UNNEST($2::BIGINT[])",
            )
            .bind(order_uid)
            .bind(chrt_ids)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
