use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;

use crate::domain::{Delivery, Item, Order, Payment};
use crate::usecase::OrderRepository;

use super::RepositoryError;

// ============================================================================
// Postgres Order Repository
// ============================================================================
//
// Tables: orders, deliveries, payments, order_items (one order row owns one
// delivery, one payment and many items).
//
// An order and all its children are written in a single transaction.
// orders.order_uid is UNIQUE, so two concurrent deliveries of the same order
// cannot both commit; the loser gets RepositoryError::Duplicate.
//
// ============================================================================

const SCHEMA: &str = include_str!("schema.sql");

const ORDER_COLUMNS: &str = "
    o.id, o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
    o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
    d.name AS d_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
    p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
    p.bank, p.delivery_cost, p.goods_total, p.custom_fee";

const ITEM_COLUMNS: &str =
    "order_id, chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status";

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Order schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_order(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<i64, RepositoryError> {
        let result = sqlx::query_scalar::<Postgres, i64>(
            "INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature, customer_id,
                delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id",
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
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .fetch_one(&mut **tx)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                Err(RepositoryError::Duplicate(order.order_uid.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_delivery(
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        delivery: &Delivery,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO deliveries (order_id, name, phone, zip, city, address, region, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order_id)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_payment(
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        payment: &Payment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payments (
                order_id, transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order_id)
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
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        items: &[Item],
    ) -> Result<(), RepositoryError> {
        for item in items {
            sqlx::query(
                "INSERT INTO order_items (
                    order_id, chrt_id, track_number, price, rid, name, sale,
                    size, total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(order_id)
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
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn items_by_order_ids(
        &self,
        order_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Item>>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, id"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<i64, Vec<Item>> = HashMap::new();
        for row in rows {
            let order_id: i64 = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(item_from_row(&row)?);
        }
        Ok(items)
    }
}

fn order_from_row(row: &PgRow) -> Result<(i64, Order), sqlx::Error> {
    let delivery = Delivery {
        name: row.try_get("d_name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    };

    let payment = Payment {
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
    };

    let order = Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery,
        payment,
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    };

    Ok((row.try_get("id")?, order))
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
impl OrderRepository for PostgresOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        // Rolled back on drop if any insert fails
        let mut tx = self.pool.begin().await?;

        let order_id = Self::insert_order(&mut tx, order).await?;
        Self::insert_delivery(&mut tx, order_id, &order.delivery).await?;
        Self::insert_payment(&mut tx, order_id, &order.payment).await?;
        Self::insert_items(&mut tx, order_id, &order.items).await?;

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            order_id,
            items = order.items.len(),
            "Order row written"
        );
        Ok(())
    }

    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM orders o
             JOIN deliveries d ON o.id = d.order_id
             JOIN payments p ON o.id = p.order_id
             WHERE o.order_uid = $1"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(uid.to_string()))?;

        let (order_id, mut order) = order_from_row(&row)?;
        order.items = self
            .items_by_order_ids(&[order_id])
            .await?
            .remove(&order_id)
            .unwrap_or_default();

        Ok(order)
    }

    async fn check_idempotency_key(&self, uid: &str) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)",
        )
        .bind(uid)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_last_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM orders o
             JOIN deliveries d ON o.id = d.order_id
             JOIN payments p ON o.id = p.order_id
             ORDER BY o.date_created DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(order_from_row(row)?);
        }

        let ids: Vec<i64> = orders.iter().map(|(id, _)| *id).collect();
        let mut items = self.items_by_order_ids(&ids).await?;

        Ok(orders
            .into_iter()
            .map(|(id, mut order)| {
                order.items = items.remove(&id).unwrap_or_default();
                order
            })
            .collect())
    }
}
