//! Credit store contracts and in-memory implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, UserId};
use tokio::sync::{Mutex, RwLock};

use crate::error::LedgerError;

use super::ledger::{CreditChangeReason, CreditChanged, CreditRow, UserCredit};

/// Persistence contract for credit accounts.
///
/// `mutate` is the only write path for existing rows: it acquires the row's
/// pessimistic write lock for the duration of the closure, bumps the
/// optimistic version on commit, and commits nothing when the closure fails.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Creates an account row; fails if one already exists.
    async fn create(&self, user_id: UserId, initial: Money) -> Result<(), LedgerError>;

    /// Reads an account row without locking.
    async fn get(&self, user_id: UserId) -> Result<Option<CreditRow>, LedgerError>;

    /// Runs `f` against the locked row and commits the result.
    async fn mutate<F>(&self, user_id: UserId, f: F) -> Result<Vec<CreditChanged>, LedgerError>
    where
        F: FnOnce(&mut UserCredit) -> Result<(), LedgerError> + Send;
}

/// Append-only audit trail of balance changes.
#[async_trait]
pub trait CreditHistoryStore: Send + Sync {
    async fn append(&self, row: CreditHistoryRow) -> Result<(), LedgerError>;

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CreditHistoryRow>, LedgerError>;
}

/// One audit row per balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditHistoryRow {
    pub user_id: UserId,
    pub previous: Money,
    pub delta: Money,
    pub current: Money,
    pub reason: CreditChangeReason,
    pub recorded_at: DateTime<Utc>,
}

impl From<CreditChanged> for CreditHistoryRow {
    fn from(event: CreditChanged) -> Self {
        Self {
            user_id: event.user_id,
            previous: event.previous,
            delta: event.delta,
            current: event.current,
            reason: event.reason,
            recorded_at: event.occurred_at,
        }
    }
}

/// In-memory credit store.
///
/// Each row lives behind its own async mutex; holding the guard across the
/// closure is the pessimistic lock, so no version conflict can occur here.
/// The version is still bumped per commit for parity with the SQL store.
#[derive(Clone, Default)]
pub struct InMemoryCreditStore {
    rows: Arc<RwLock<HashMap<UserId, Arc<Mutex<CreditRow>>>>>,
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CreditStore for InMemoryCreditStore {
    async fn create(&self, user_id: UserId, initial: Money) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&user_id) {
            return Err(LedgerError::AlreadyExists(format!("credit/{user_id}")));
        }
        rows.insert(
            user_id,
            Arc::new(Mutex::new(CreditRow::new(user_id, initial))),
        );
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<CreditRow>, LedgerError> {
        let handle = {
            let rows = self.rows.read().await;
            rows.get(&user_id).cloned()
        };
        match handle {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn mutate<F>(&self, user_id: UserId, f: F) -> Result<Vec<CreditChanged>, LedgerError>
    where
        F: FnOnce(&mut UserCredit) -> Result<(), LedgerError> + Send,
    {
        let handle = {
            let rows = self.rows.read().await;
            rows.get(&user_id)
                .cloned()
                .ok_or(LedgerError::CreditNotFound(user_id))?
        };

        // Concurrent mutators of the same account serialize here.
        let mut locked = handle.lock().await;

        let mut credit = UserCredit::from_row(locked.clone());
        f(&mut credit)?;

        let (mut row, events) = credit.into_parts();
        row.version = locked.version + 1;
        row.updated_at = Utc::now();
        *locked = row;
        Ok(events)
    }
}

/// In-memory credit history store.
#[derive(Clone, Default)]
pub struct InMemoryCreditHistoryStore {
    rows: Arc<RwLock<Vec<CreditHistoryRow>>>,
}

impl InMemoryCreditHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl CreditHistoryStore for InMemoryCreditHistoryStore {
    async fn append(&self, row: CreditHistoryRow) -> Result<(), LedgerError> {
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CreditHistoryRow>, LedgerError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryCreditStore::new();
        let user = UserId::new(1);
        store.create(user, Money::from_cents(10_000)).await.unwrap();

        let row = store.get(user).await.unwrap().unwrap();
        assert_eq!(row.amount, Money::from_cents(10_000));
        assert_eq!(row.version, 0);
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let store = InMemoryCreditStore::new();
        let user = UserId::new(1);
        store.create(user, Money::zero()).await.unwrap();

        let result = store.create(user, Money::zero()).await;
        assert!(matches!(result, Err(LedgerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn mutate_commits_and_bumps_version() {
        let store = InMemoryCreditStore::new();
        let user = UserId::new(1);
        store.create(user, Money::from_cents(10_000)).await.unwrap();

        let events = store
            .mutate(user, |c| {
                c.debit(Money::from_cents(3000), CreditChangeReason::OrderPayment)
            })
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        let row = store.get(user).await.unwrap().unwrap();
        assert_eq!(row.amount, Money::from_cents(7000));
        assert_eq!(row.version, 1);
    }

    #[tokio::test]
    async fn failed_mutation_commits_nothing() {
        let store = InMemoryCreditStore::new();
        let user = UserId::new(1);
        store.create(user, Money::from_cents(500)).await.unwrap();

        let result = store
            .mutate(user, |c| {
                c.debit(Money::from_cents(3000), CreditChangeReason::OrderPayment)
            })
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        let row = store.get(user).await.unwrap().unwrap();
        assert_eq!(row.amount, Money::from_cents(500));
        assert_eq!(row.version, 0);
    }

    #[tokio::test]
    async fn mutate_missing_account_fails() {
        let store = InMemoryCreditStore::new();
        let result = store.mutate(UserId::new(9), |_| Ok(())).await;
        assert!(matches!(result, Err(LedgerError::CreditNotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_debits_serialize_without_lost_updates() {
        let store = Arc::new(InMemoryCreditStore::new());
        let user = UserId::new(1);
        store.create(user, Money::from_cents(10_000)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .mutate(user, |c| {
                        c.debit(Money::from_cents(1000), CreditChangeReason::OrderPayment)
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let row = store.get(user).await.unwrap().unwrap();
        assert_eq!(row.amount, Money::zero());
        assert_eq!(row.version, 10);
    }

    #[tokio::test]
    async fn history_appends_and_filters() {
        let store = InMemoryCreditHistoryStore::new();
        let event = CreditChanged {
            user_id: UserId::new(1),
            previous: Money::from_cents(1000),
            delta: Money::from_cents(-300),
            current: Money::from_cents(700),
            reason: CreditChangeReason::OrderPayment,
            occurred_at: Utc::now(),
        };
        store.append(event.into()).await.unwrap();

        assert_eq!(store.list_by_user(UserId::new(1)).await.unwrap().len(), 1);
        assert!(store.list_by_user(UserId::new(2)).await.unwrap().is_empty());
    }
}
