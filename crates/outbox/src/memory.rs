//! In-memory relay store implementations.
//!
//! Back the test-suite and the default single-process runtime. Every method
//! takes the table's write lock for its whole body, so each call is atomic
//! the way a row-level database transaction would be.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{RecordId, SagaId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::record::{InboxRecord, OutboxRecord, OutboxStatus, SagaStatus, StepStatus};
use crate::store::{InboxStore, OutboxStore};

/// In-memory outbox table.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    rows: Arc<RwLock<Vec<OutboxRecord>>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Snapshot of every record in insertion order. Inspection surface for
    /// tests and operational tooling.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, record: OutboxRecord) -> Result<()> {
        self.rows.write().await.push(record);
        Ok(())
    }

    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let mut rows = self.rows.write().await;
        let mut claimed = Vec::new();
        for row in rows.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if row.outbox_status.is_none() {
                row.outbox_status = Some(OutboxStatus::Started);
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }

    async fn find_by_saga_and_status(
        &self,
        saga_id: SagaId,
        status: OutboxStatus,
    ) -> Result<Option<OutboxRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| r.saga_id == saga_id && r.outbox_status == Some(status))
            .cloned())
    }

    async fn list_by_saga_status(
        &self,
        saga_status: SagaStatus,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.saga_status == saga_status && r.outbox_status == Some(outbox_status))
            .cloned()
            .collect())
    }

    async fn finalize(
        &self,
        id: RecordId,
        outcome: OutboxStatus,
        saga_status: SagaStatus,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(crate::StoreError::RecordNotFound(id))?;

        // Terminal outcome and processed_at are set exactly once.
        if row.is_terminal() {
            return Ok(());
        }
        row.outbox_status = Some(outcome);
        row.saga_status = saga_status;
        row.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn set_saga_status(&self, id: RecordId, saga_status: SagaStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(crate::StoreError::RecordNotFound(id))?;
        row.saga_status = saga_status;
        Ok(())
    }

    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<OutboxRecord>> {
        let rows = self.rows.read().await;
        let mut records: Vec<_> = rows
            .iter()
            .filter(|r| r.saga_id == saga_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

/// In-memory inbox table.
#[derive(Clone, Default)]
pub struct InMemoryInboxStore {
    rows: Arc<RwLock<Vec<InboxRecord>>>,
}

impl InMemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Snapshot of every record in insertion order. Inspection surface for
    /// tests and operational tooling.
    pub async fn records(&self) -> Vec<InboxRecord> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn insert(&self, record: InboxRecord) -> Result<bool> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        rows.push(record);
        Ok(true)
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<InboxRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.outbox_status.is_none() && r.step_status.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_by_step_status(
        &self,
        status: StepStatus,
        limit: usize,
    ) -> Result<Vec<InboxRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.step_status == Some(status))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(
        &self,
        id: RecordId,
        step: StepStatus,
        outbox: OutboxStatus,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(crate::StoreError::RecordNotFound(id))?;
        row.step_status = Some(step);
        row.outbox_status = Some(outbox);
        if row.processed_at.is_none() {
            row.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_step_status(&self, id: RecordId, step: StepStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(crate::StoreError::RecordNotFound(id))?;
        row.step_status = Some(step);
        Ok(())
    }

    async fn set_outbox_status(&self, id: RecordId, outbox: OutboxStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(crate::StoreError::RecordNotFound(id))?;
        row.outbox_status = Some(outbox);
        Ok(())
    }

    async fn find(&self, id: RecordId) -> Result<Option<InboxRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<InboxRecord>> {
        let rows = self.rows.read().await;
        let mut records: Vec<_> = rows
            .iter()
            .filter(|r| r.saga_id == saga_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
