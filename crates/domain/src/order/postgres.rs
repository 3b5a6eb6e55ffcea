//! PostgreSQL order store.
//!
//! Items and delivery details are stored as JSONB columns; the optimistic
//! version guard mirrors the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::OrderError;

use super::{DeliveryInfo, Order, OrderItem, OrderStatus, OrderStore};

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> Result<Order, OrderError> {
        let status: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| OrderError::Serialization(serde::de::Error::custom("bad status")))?;
        let items: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items)?;
        let delivery: serde_json::Value = row.try_get("delivery")?;
        let delivery: DeliveryInfo = serde_json::from_value(delivery)?;

        Ok(Order::from_row(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            UserId::new(row.try_get::<i64, _>("user_id")?),
            status,
            Money::from_cents(row.try_get::<i64, _>("total_cents")?),
            items,
            delivery,
            row.try_get::<Option<String>, _>("failure_reason")?,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<i64, _>("version")?,
        ))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_cents, items, delivery, failure_reason, created_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_i64())
        .bind(order.status().as_str())
        .bind(order.total_price().cents())
        .bind(serde_json::to_value(order.items())?)
        .bind(serde_json::to_value(order.delivery())?)
        .bind(order.failure_reason())
        .bind(order.created_at())
        .bind(order.version())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(user_id.as_i64())
        .bind(page.offset as i64)
        .bind(page.limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update(&self, order: &mut Order) -> Result<(), OrderError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, failure_reason = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(order.status().as_str())
        .bind(order.failure_reason())
        .bind(order.id().as_uuid())
        .bind(order.version())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::Conflict(order.id()));
        }
        order.set_version(order.version() + 1);
        Ok(())
    }
}
