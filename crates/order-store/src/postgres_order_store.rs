use super::{OrderStore, SaveOutcome, StoreError};
use async_trait::async_trait;
use common::metrics::record_store_operation;
use domain::{Delivery, Item, Order, Payment};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const SELECT_AGGREGATE: &str = r#"
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
        o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
        p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
        p.bank, p.delivery_cost, p.goods_total, p.custom_fee,
        i.chrt_id, i.track_number AS item_track_number, i.price, i.rid,
        i.name AS item_name, i.sale, i.size, i.total_price, i.nm_id, i.brand, i.status
    FROM orders o
    INNER JOIN deliveries d ON o.order_uid = d.order_uid
    INNER JOIN payments p ON o.order_uid = p.order_uid
    INNER JOIN items i ON o.order_uid = i.order_uid
"#;

/// PostgreSQL implementation of the order store
pub struct PostgresOrderStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Get the database pool (useful for testing)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `operation` under the configured deadline. When the deadline
    /// fires the future is dropped, which rolls back any open transaction.
    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        };

        let status = match &result {
            Ok(_) => "success",
            Err(StoreError::NotFound(_)) => "not_found",
            Err(_) => "error",
        };
        record_store_operation(operation, status, start.elapsed().as_secs_f64());

        result
    }

    async fn insert_aggregate(&self, order: &Order) -> Result<SaveOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(&order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // First write wins; the committed children are left untouched.
            debug!("Order {} already persisted, skipping replay", order.order_uid);
            return Ok(SaveOutcome::AlreadyExists);
        }

        let delivery = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO deliveries (
                order_uid, name, phone, zip, city, address, region, email
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut *tx)
        .await?;

        let payment = &order.payment;
        let payment_rows = sqlx::query(
            r#"
            INSERT INTO payments (
                transaction, order_uid, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&payment.transaction)
        .bind(&order.order_uid)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if payment_rows == 0 {
            warn!(
                "Payment transaction {} already belongs to another order, dropping order {}",
                payment.transaction, order.order_uid
            );
            tx.rollback().await?;
            return Ok(SaveOutcome::TransactionConflict);
        }

        for (position, item) in order.items.iter().enumerate() {
            let position = item_position(order, position)?;
            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, position, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (order_uid, position) DO NOTHING
                "#,
            )
            .bind(&order.order_uid)
            .bind(position)
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
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            "Order {} saved with {} items",
            order.order_uid,
            order.items.len()
        );

        Ok(SaveOutcome::Inserted)
    }

    async fn select_one(&self, order_uid: &str) -> Result<Order, StoreError> {
        let query = format!("{SELECT_AGGREGATE} WHERE o.order_uid = $1 ORDER BY i.position ASC");
        let rows = sqlx::query(&query)
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await?;

        let mut orders = group_rows(&rows)?;
        match orders.pop() {
            Some(order) => Ok(order),
            None => Err(StoreError::NotFound(order_uid.to_string())),
        }
    }

    async fn select_all(&self) -> Result<Vec<Order>, StoreError> {
        let query = format!("{SELECT_AGGREGATE} ORDER BY o.order_uid ASC, i.position ASC");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let orders = group_rows(&rows)?;
        if orders.is_empty() {
            info!("No complete orders found in database");
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn save(&self, order: &Order) -> Result<SaveOutcome, StoreError> {
        let result = self.timed("save", self.insert_aggregate(order)).await;
        if let Err(e) = &result {
            error!("Failed to save order {}: {}", order.order_uid, e);
        }
        result
    }

    async fn load(&self, order_uid: &str) -> Result<Order, StoreError> {
        debug!("Loading order {}", order_uid);
        self.timed("load", self.select_one(order_uid)).await
    }

    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.timed("load_all", self.select_all()).await?;
        info!("Loaded {} orders from database", orders.len());
        Ok(orders)
    }
}

/// `items.position` is an INTEGER column
fn item_position(order: &Order, position: usize) -> Result<i32, StoreError> {
    i32::try_from(position).map_err(|_| StoreError::TooManyItems {
        order_uid: order.order_uid.clone(),
        count: order.items.len(),
    })
}

/// Fold the fan-out join back into aggregates, one per `order_uid`.
/// Rows for the same order may arrive in any order relative to other orders;
/// items keep the order in which their rows appear.
fn group_rows(rows: &[PgRow]) -> Result<Vec<Order>, sqlx::Error> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut orders: Vec<Order> = Vec::new();

    for row in rows {
        let order_uid: String = row.try_get("order_uid")?;
        let item = item_from_row(row)?;

        match index.get(&order_uid) {
            Some(&slot) => orders[slot].items.push(item),
            None => {
                let mut order = order_from_row(row)?;
                order.items.push(item);
                index.insert(order_uid, orders.len());
                orders.push(order);
            }
        }
    }

    Ok(orders)
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: row.try_get("delivery_name")?,
            phone: row.try_get("phone")?,
            zip: row.try_get("zip")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            region: row.try_get("region")?,
            email: row.try_get("email")?,
        },
        payment: Payment {
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
        },
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

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("item_track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("item_name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}
