//! PostgreSQL stock stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::LedgerError;

use super::ledger::{ProductStock, StockChangeReason, StockChanged, StockRow};
use super::store::{StockHistoryRow, StockHistoryStore, StockStore};

#[derive(Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_stock(row: PgRow) -> Result<StockRow, LedgerError> {
        Ok(StockRow {
            product_id: ProductId::new(row.try_get::<i64, _>("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            version: row.try_get::<i64, _>("version")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn create(&self, product_id: ProductId, quantity: u32) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "INSERT INTO product_stocks (product_id, quantity, version, updated_at) \
             VALUES ($1, $2, 0, now()) ON CONFLICT (product_id) DO NOTHING",
        )
        .bind(product_id.as_i64())
        .bind(quantity as i32)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyExists(format!("stock/{product_id}")));
        }
        Ok(())
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<StockRow>, LedgerError> {
        let row = sqlx::query("SELECT * FROM product_stocks WHERE product_id = $1")
            .bind(product_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_stock).transpose()
    }

    async fn mutate<F>(&self, product_id: ProductId, f: F) -> Result<Vec<StockChanged>, LedgerError>
    where
        F: FnOnce(&mut ProductStock) -> Result<(), LedgerError> + Send,
    {
        self.mutate_many(vec![product_id], |stocks| f(&mut stocks[0]))
            .await
    }

    async fn mutate_many<F>(
        &self,
        product_ids: Vec<ProductId>,
        f: F,
    ) -> Result<Vec<StockChanged>, LedgerError>
    where
        F: FnOnce(&mut [ProductStock]) -> Result<(), LedgerError> + Send,
    {
        let mut ids = product_ids;
        ids.sort();
        ids.dedup();

        let mut tx = self.pool.begin().await?;

        // Rows are locked one by one in ascending id order; concurrent
        // multi-row mutations cannot deadlock.
        let mut stocks = Vec::with_capacity(ids.len());
        let mut expected_versions = Vec::with_capacity(ids.len());
        for id in &ids {
            let row = sqlx::query("SELECT * FROM product_stocks WHERE product_id = $1 FOR UPDATE")
                .bind(id.as_i64())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(LedgerError::StockNotFound(*id))?;
            let row = Self::row_to_stock(row)?;
            expected_versions.push(row.version);
            stocks.push(ProductStock::from_row(row));
        }

        f(&mut stocks)?;

        let mut events = Vec::new();
        for (stock, expected) in stocks.into_iter().zip(expected_versions) {
            let (row, mut stock_events) = stock.into_parts();
            if stock_events.is_empty() {
                continue;
            }
            let result = sqlx::query(
                "UPDATE product_stocks SET quantity = $1, version = version + 1, updated_at = now() \
                 WHERE product_id = $2 AND version = $3",
            )
            .bind(row.quantity as i32)
            .bind(row.product_id.as_i64())
            .bind(expected)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::Conflict(format!("stock/{}", row.product_id)));
            }
            events.append(&mut stock_events);
        }

        tx.commit().await?;
        Ok(events)
    }
}

#[derive(Clone)]
pub struct PgStockHistoryStore {
    pool: PgPool,
}

impl PgStockHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_history(row: PgRow) -> Result<StockHistoryRow, LedgerError> {
        let reason: String = row.try_get("reason")?;
        let reason = StockChangeReason::parse(&reason)
            .ok_or_else(|| LedgerError::Decode(format!("unknown stock reason: {reason}")))?;
        Ok(StockHistoryRow {
            product_id: ProductId::new(row.try_get::<i64, _>("product_id")?),
            previous: row.try_get::<i32, _>("previous_quantity")? as u32,
            delta: row.try_get::<i64, _>("delta")?,
            current: row.try_get::<i32, _>("current_quantity")? as u32,
            reason,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        })
    }
}

#[async_trait]
impl StockHistoryStore for PgStockHistoryStore {
    async fn append(&self, row: StockHistoryRow) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO product_stock_history (product_id, previous_quantity, delta, current_quantity, reason, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(row.product_id.as_i64())
        .bind(row.previous as i32)
        .bind(row.delta)
        .bind(row.current as i32)
        .bind(row.reason.as_str())
        .bind(row.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockHistoryRow>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM product_stock_history WHERE product_id = $1 ORDER BY recorded_at",
        )
        .bind(product_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_history).collect()
    }
}
