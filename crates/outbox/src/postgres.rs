//! PostgreSQL-backed relay store implementations.
//!
//! One store instance per table; the four relay tables share a single schema
//! shape. Statuses are stored as text, the unset delivery status as NULL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, RecordId, SagaId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::record::{InboxRecord, OutboxRecord, OutboxStatus, SagaKind, SagaStatus, StepStatus};
use crate::store::{InboxStore, OutboxStore};

/// Runs the workspace database migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

fn parse_kind(value: &str) -> Result<SagaKind> {
    SagaKind::parse(value).ok_or_else(|| StoreError::Decode(format!("unknown saga kind: {value}")))
}

fn parse_saga_status(value: &str) -> Result<SagaStatus> {
    SagaStatus::parse(value)
        .ok_or_else(|| StoreError::Decode(format!("unknown saga status: {value}")))
}

fn parse_outbox_status(value: Option<&str>) -> Result<Option<OutboxStatus>> {
    match value {
        None => Ok(None),
        Some(v) => OutboxStatus::parse(v)
            .map(Some)
            .ok_or_else(|| StoreError::Decode(format!("unknown outbox status: {v}"))),
    }
}

fn parse_step_status(value: Option<&str>) -> Result<Option<StepStatus>> {
    match value {
        None => Ok(None),
        Some(v) => StepStatus::parse(v)
            .map(Some)
            .ok_or_else(|| StoreError::Decode(format!("unknown step status: {v}"))),
    }
}

/// PostgreSQL outbox table.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
    table: &'static str,
}

impl PgOutboxStore {
    /// The order context's payment-step outbox.
    pub fn payment(pool: PgPool) -> Self {
        Self {
            pool,
            table: "payment_outbox",
        }
    }

    /// The order context's stock-step outbox.
    pub fn stock(pool: PgPool) -> Self {
        Self {
            pool,
            table: "stock_outbox",
        }
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        let kind: String = row.try_get("kind")?;
        let saga_status: String = row.try_get("saga_status")?;
        let outbox_status: Option<String> = row.try_get("outbox_status")?;

        Ok(OutboxRecord {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            kind: parse_kind(&kind)?,
            payload: row.try_get("payload")?,
            saga_status: parse_saga_status(&saga_status)?,
            outbox_status: parse_outbox_status(outbox_status.as_deref())?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            processed_at: row.try_get::<Option<DateTime<Utc>>, _>("processed_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn enqueue(&self, record: OutboxRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, saga_id, order_id, kind, payload, saga_status, outbox_status, created_at, processed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.table
        );
        sqlx::query(&sql)
            .bind(record.id.as_uuid())
            .bind(record.saga_id.as_uuid())
            .bind(record.order_id.as_uuid())
            .bind(record.kind.as_str())
            .bind(&record.payload)
            .bind(record.saga_status.as_str())
            .bind(record.outbox_status.map(|s| s.as_str()))
            .bind(record.created_at)
            .bind(record.processed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        // Claim and read in one statement so the Started mark commits with
        // the read.
        let sql = format!(
            "UPDATE {t} SET outbox_status = 'Started' \
             WHERE id IN (SELECT id FROM {t} WHERE outbox_status IS NULL ORDER BY created_at LIMIT $1) \
             RETURNING *",
            t = self.table
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn find_by_saga_and_status(
        &self,
        saga_id: SagaId,
        status: OutboxStatus,
    ) -> Result<Option<OutboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE saga_id = $1 AND outbox_status = $2 LIMIT 1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(saga_id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_record).transpose()
    }

    async fn list_by_saga_status(
        &self,
        saga_status: SagaStatus,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE saga_status = $1 AND outbox_status = $2 ORDER BY created_at",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(saga_status.as_str())
            .bind(outbox_status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn finalize(
        &self,
        id: RecordId,
        outcome: OutboxStatus,
        saga_status: SagaStatus,
    ) -> Result<()> {
        // The status guard keeps the first terminal outcome and timestamp.
        let sql = format!(
            "UPDATE {} SET outbox_status = $1, saga_status = $2, processed_at = now() \
             WHERE id = $3 AND (outbox_status IS NULL OR outbox_status = 'Started')",
            self.table
        );
        sqlx::query(&sql)
            .bind(outcome.as_str())
            .bind(saga_status.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_saga_status(&self, id: RecordId, saga_status: SagaStatus) -> Result<()> {
        let sql = format!("UPDATE {} SET saga_status = $1 WHERE id = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(saga_status.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<OutboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE saga_id = $1 ORDER BY created_at",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(saga_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }
}

/// PostgreSQL inbox table.
#[derive(Clone)]
pub struct PgInboxStore {
    pool: PgPool,
    table: &'static str,
}

impl PgInboxStore {
    /// The credit context's inbox.
    pub fn credit(pool: PgPool) -> Self {
        Self {
            pool,
            table: "credit_inbox",
        }
    }

    /// The inventory context's inbox.
    pub fn stock(pool: PgPool) -> Self {
        Self {
            pool,
            table: "stock_inbox",
        }
    }

    fn row_to_record(row: PgRow) -> Result<InboxRecord> {
        let kind: String = row.try_get("kind")?;
        let step_status: Option<String> = row.try_get("step_status")?;
        let outbox_status: Option<String> = row.try_get("outbox_status")?;

        Ok(InboxRecord {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            kind: parse_kind(&kind)?,
            payload: row.try_get("payload")?,
            step_status: parse_step_status(step_status.as_deref())?,
            outbox_status: parse_outbox_status(outbox_status.as_deref())?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            processed_at: row.try_get::<Option<DateTime<Utc>>, _>("processed_at")?,
        })
    }
}

#[async_trait]
impl InboxStore for PgInboxStore {
    async fn insert(&self, record: InboxRecord) -> Result<bool> {
        let sql = format!(
            "INSERT INTO {} (id, saga_id, order_id, kind, payload, step_status, outbox_status, created_at, processed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(record.id.as_uuid())
            .bind(record.saga_id.as_uuid())
            .bind(record.order_id.as_uuid())
            .bind(record.kind.as_str())
            .bind(&record.payload)
            .bind(record.step_status.map(|s| s.as_str()))
            .bind(record.outbox_status.map(|s| s.as_str()))
            .bind(record.created_at)
            .bind(record.processed_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<InboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE outbox_status IS NULL AND step_status IS NULL \
             ORDER BY created_at LIMIT $1",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn fetch_by_step_status(
        &self,
        status: StepStatus,
        limit: usize,
    ) -> Result<Vec<InboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE step_status = $1 ORDER BY created_at LIMIT $2",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn mark_processed(
        &self,
        id: RecordId,
        step: StepStatus,
        outbox: OutboxStatus,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET step_status = $1, outbox_status = $2, \
             processed_at = COALESCE(processed_at, now()) WHERE id = $3",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(step.as_str())
            .bind(outbox.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn set_step_status(&self, id: RecordId, step: StepStatus) -> Result<()> {
        let sql = format!("UPDATE {} SET step_status = $1 WHERE id = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(step.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn set_outbox_status(&self, id: RecordId, outbox: OutboxStatus) -> Result<()> {
        let sql = format!("UPDATE {} SET outbox_status = $1 WHERE id = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(outbox.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn find(&self, id: RecordId) -> Result<Option<InboxRecord>> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_record).transpose()
    }

    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<InboxRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE saga_id = $1 ORDER BY created_at",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(saga_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }
}
