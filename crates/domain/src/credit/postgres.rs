//! PostgreSQL credit stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::LedgerError;

use super::ledger::{CreditChangeReason, CreditChanged, CreditRow, UserCredit};
use super::store::{CreditHistoryRow, CreditHistoryStore, CreditStore};

#[derive(Clone)]
pub struct PgCreditStore {
    pool: PgPool,
}

impl PgCreditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_credit(row: PgRow) -> Result<CreditRow, LedgerError> {
        Ok(CreditRow {
            user_id: UserId::new(row.try_get::<i64, _>("user_id")?),
            amount: Money::from_cents(row.try_get::<i64, _>("amount_cents")?),
            version: row.try_get::<i64, _>("version")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl CreditStore for PgCreditStore {
    async fn create(&self, user_id: UserId, initial: Money) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "INSERT INTO user_credits (user_id, amount_cents, version, updated_at) \
             VALUES ($1, $2, 0, now()) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id.as_i64())
        .bind(initial.cents())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyExists(format!("credit/{user_id}")));
        }
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<CreditRow>, LedgerError> {
        let row = sqlx::query("SELECT * FROM user_credits WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_credit).transpose()
    }

    async fn mutate<F>(&self, user_id: UserId, f: F) -> Result<Vec<CreditChanged>, LedgerError>
    where
        F: FnOnce(&mut UserCredit) -> Result<(), LedgerError> + Send,
    {
        let mut tx = self.pool.begin().await?;

        // Pessimistic row lock held until commit/rollback.
        let row = sqlx::query("SELECT * FROM user_credits WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::CreditNotFound(user_id))?;
        let row = Self::row_to_credit(row)?;
        let expected_version = row.version;

        let mut credit = UserCredit::from_row(row);
        f(&mut credit)?;
        let (row, events) = credit.into_parts();

        // The version guard backs up the row lock, matching the original's
        // optimistic check.
        let result = sqlx::query(
            "UPDATE user_credits SET amount_cents = $1, version = version + 1, updated_at = now() \
             WHERE user_id = $2 AND version = $3",
        )
        .bind(row.amount.cents())
        .bind(user_id.as_i64())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Conflict(format!("credit/{user_id}")));
        }

        tx.commit().await?;
        Ok(events)
    }
}

#[derive(Clone)]
pub struct PgCreditHistoryStore {
    pool: PgPool,
}

impl PgCreditHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_history(row: PgRow) -> Result<CreditHistoryRow, LedgerError> {
        let reason: String = row.try_get("reason")?;
        let reason = CreditChangeReason::parse(&reason)
            .ok_or_else(|| LedgerError::Decode(format!("unknown credit reason: {reason}")))?;
        Ok(CreditHistoryRow {
            user_id: UserId::new(row.try_get::<i64, _>("user_id")?),
            previous: Money::from_cents(row.try_get::<i64, _>("previous_cents")?),
            delta: Money::from_cents(row.try_get::<i64, _>("delta_cents")?),
            current: Money::from_cents(row.try_get::<i64, _>("current_cents")?),
            reason,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        })
    }
}

#[async_trait]
impl CreditHistoryStore for PgCreditHistoryStore {
    async fn append(&self, row: CreditHistoryRow) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO user_credit_history (user_id, previous_cents, delta_cents, current_cents, reason, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(row.user_id.as_i64())
        .bind(row.previous.cents())
        .bind(row.delta.cents())
        .bind(row.current.cents())
        .bind(row.reason.as_str())
        .bind(row.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CreditHistoryRow>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM user_credit_history WHERE user_id = $1 ORDER BY recorded_at",
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_history).collect()
    }
}
