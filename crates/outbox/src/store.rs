//! Store contracts for the relay tables.

use async_trait::async_trait;
use common::{RecordId, SagaId};

use crate::error::Result;
use crate::record::{InboxRecord, OutboxRecord, OutboxStatus, SagaStatus, StepStatus};

/// Persistence contract for a participant's outbox table.
///
/// Records only move forward: unset → `Started` → `Completed`/`Failed`.
/// `finalize` is idempotent — a record that already reached a terminal
/// status keeps its first outcome and `processed_at`.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts a new record with unset delivery status.
    ///
    /// Callers invoke this inside the unit of work of the business change
    /// that makes the step necessary (transactional outbox guarantee).
    async fn enqueue(&self, record: OutboxRecord) -> Result<()>;

    /// Returns up to `limit` unclaimed records, marking them `Started`
    /// atomically with the read.
    ///
    /// Claiming narrows but does not eliminate the double-delivery window;
    /// consumers must stay idempotent.
    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Looks up the single record of a saga currently in `status`.
    async fn find_by_saga_and_status(
        &self,
        saga_id: SagaId,
        status: OutboxStatus,
    ) -> Result<Option<OutboxRecord>>;

    /// Lists records by workflow status, e.g. completed steps flagged
    /// `Compensating` for the compensation sweep.
    async fn list_by_saga_status(
        &self,
        saga_status: SagaStatus,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxRecord>>;

    /// Moves a record to a terminal delivery status, stamping `processed_at`
    /// exactly once.
    async fn finalize(
        &self,
        id: RecordId,
        outcome: OutboxStatus,
        saga_status: SagaStatus,
    ) -> Result<()>;

    /// Updates only the workflow status of a record.
    async fn set_saga_status(&self, id: RecordId, saga_status: SagaStatus) -> Result<()>;

    /// All records of a saga, oldest first. Audit/inspection surface.
    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<OutboxRecord>>;
}

/// Persistence contract for a participant's inbox table.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Inserts a mirrored record. Returns `false` without writing when a
    /// record with the same id already exists (idempotent delivery).
    async fn insert(&self, record: InboxRecord) -> Result<bool>;

    /// Records not yet touched by the participant, oldest first.
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<InboxRecord>>;

    /// Records whose participant verdict equals `status`, oldest first.
    /// Serves the failure and compensation sweeps.
    async fn fetch_by_step_status(&self, status: StepStatus, limit: usize)
    -> Result<Vec<InboxRecord>>;

    /// Sets the verdict and delivery outcome together, stamping
    /// `processed_at` exactly once.
    async fn mark_processed(
        &self,
        id: RecordId,
        step: StepStatus,
        outbox: OutboxStatus,
    ) -> Result<()>;

    /// Updates only the participant verdict.
    async fn set_step_status(&self, id: RecordId, step: StepStatus) -> Result<()>;

    /// Updates only the delivery status.
    async fn set_outbox_status(&self, id: RecordId, outbox: OutboxStatus) -> Result<()>;

    /// Looks up a record by id.
    async fn find(&self, id: RecordId) -> Result<Option<InboxRecord>>;

    /// All records of a saga, oldest first. Audit/inspection surface.
    async fn list_by_saga(&self, saga_id: SagaId) -> Result<Vec<InboxRecord>>;
}
