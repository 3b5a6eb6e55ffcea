//! Stock store contracts and in-memory implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::LedgerError;

use super::ledger::{ProductStock, StockChangeReason, StockChanged, StockRow};

/// Persistence contract for stock rows.
///
/// `mutate_many` locks every requested row in ascending product-id order
/// (the deadlock-avoidance discipline shared with the SQL implementation),
/// runs the closure against all of them, and commits either every row or
/// none.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Creates a stock row; fails if one already exists.
    async fn create(&self, product_id: ProductId, quantity: u32) -> Result<(), LedgerError>;

    /// Reads a stock row without locking.
    async fn get(&self, product_id: ProductId) -> Result<Option<StockRow>, LedgerError>;

    /// Runs `f` against one locked row and commits the result.
    async fn mutate<F>(&self, product_id: ProductId, f: F) -> Result<Vec<StockChanged>, LedgerError>
    where
        F: FnOnce(&mut ProductStock) -> Result<(), LedgerError> + Send;

    /// Runs `f` against several locked rows and commits all or nothing.
    ///
    /// The slice passed to `f` is ordered by ascending product id.
    async fn mutate_many<F>(
        &self,
        product_ids: Vec<ProductId>,
        f: F,
    ) -> Result<Vec<StockChanged>, LedgerError>
    where
        F: FnOnce(&mut [ProductStock]) -> Result<(), LedgerError> + Send;
}

/// Append-only audit trail of stock changes.
#[async_trait]
pub trait StockHistoryStore: Send + Sync {
    async fn append(&self, row: StockHistoryRow) -> Result<(), LedgerError>;

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockHistoryRow>, LedgerError>;
}

/// One audit row per stock change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockHistoryRow {
    pub product_id: ProductId,
    pub previous: u32,
    pub delta: i64,
    pub current: u32,
    pub reason: StockChangeReason,
    pub recorded_at: DateTime<Utc>,
}

impl From<StockChanged> for StockHistoryRow {
    fn from(event: StockChanged) -> Self {
        Self {
            product_id: event.product_id,
            previous: event.previous,
            delta: event.delta,
            current: event.current,
            reason: event.reason,
            recorded_at: event.occurred_at,
        }
    }
}

/// In-memory stock store with per-row async mutexes.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    rows: Arc<RwLock<HashMap<ProductId, Arc<Mutex<StockRow>>>>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handles(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<Arc<Mutex<StockRow>>>, LedgerError> {
        let rows = self.rows.read().await;
        product_ids
            .iter()
            .map(|id| {
                rows.get(id)
                    .cloned()
                    .ok_or(LedgerError::StockNotFound(*id))
            })
            .collect()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn create(&self, product_id: ProductId, quantity: u32) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&product_id) {
            return Err(LedgerError::AlreadyExists(format!("stock/{product_id}")));
        }
        rows.insert(
            product_id,
            Arc::new(Mutex::new(StockRow::new(product_id, quantity))),
        );
        Ok(())
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<StockRow>, LedgerError> {
        let handle = {
            let rows = self.rows.read().await;
            rows.get(&product_id).cloned()
        };
        match handle {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
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

        let handles = self.handles(&ids).await?;

        // Lock in ascending id order so concurrent multi-row mutations
        // cannot deadlock against each other.
        let mut guards: Vec<OwnedMutexGuard<StockRow>> = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        let mut stocks: Vec<ProductStock> = guards
            .iter()
            .map(|guard| ProductStock::from_row(guard.clone()))
            .collect();

        f(&mut stocks)?;

        let mut events = Vec::new();
        for (guard, stock) in guards.iter_mut().zip(stocks) {
            let (mut row, mut stock_events) = stock.into_parts();
            if !stock_events.is_empty() {
                row.version = guard.version + 1;
                row.updated_at = Utc::now();
            }
            **guard = row;
            events.append(&mut stock_events);
        }
        Ok(events)
    }
}

/// In-memory stock history store.
#[derive(Clone, Default)]
pub struct InMemoryStockHistoryStore {
    rows: Arc<RwLock<Vec<StockHistoryRow>>>,
}

impl InMemoryStockHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl StockHistoryStore for InMemoryStockHistoryStore {
    async fn append(&self, row: StockHistoryRow) -> Result<(), LedgerError> {
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockHistoryRow>, LedgerError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }
}
