//! Outbox relay: mirrors claimed outbox records into participant inboxes.

use std::sync::Arc;

use outbox::{InboxRecord, InboxStore, OutboxStatus, OutboxStore, SagaStatus, StepStatus};

use crate::error::SagaError;

/// Records claimed per sweep and table.
const CLAIM_BATCH: usize = 64;

/// Periodic relay between the order context's outboxes and the participant
/// inboxes.
///
/// A cheap copy step, deliberately decoupled in time from the participants'
/// business logic: it claims unprocessed outbox records (marking them
/// `Started` atomically with the read) and inserts the mirrored inbox record
/// under the same id. The shared id makes re-delivery idempotent. The relay
/// also drives compensation: completed steps flagged `Compensating` get
/// their inbox record re-opened for the participant's compensation sweep.
pub struct OutboxRelay {
    payment_outbox: Arc<dyn OutboxStore>,
    stock_outbox: Arc<dyn OutboxStore>,
    credit_inbox: Arc<dyn InboxStore>,
    stock_inbox: Arc<dyn InboxStore>,
}

impl OutboxRelay {
    pub fn new(
        payment_outbox: Arc<dyn OutboxStore>,
        stock_outbox: Arc<dyn OutboxStore>,
        credit_inbox: Arc<dyn InboxStore>,
        stock_inbox: Arc<dyn InboxStore>,
    ) -> Self {
        Self {
            payment_outbox,
            stock_outbox,
            credit_inbox,
            stock_inbox,
        }
    }

    /// Runs one sweep over both outboxes. Returns the number of records that
    /// changed state.
    pub async fn run_once(&self) -> Result<usize, SagaError> {
        let mut moved = 0;
        moved += self
            .relay(self.stock_outbox.as_ref(), self.stock_inbox.as_ref())
            .await?;
        moved += self
            .relay(self.payment_outbox.as_ref(), self.credit_inbox.as_ref())
            .await?;
        moved += self
            .sweep_compensating(self.stock_outbox.as_ref(), self.stock_inbox.as_ref())
            .await?;
        moved += self
            .sweep_compensating(self.payment_outbox.as_ref(), self.credit_inbox.as_ref())
            .await?;
        Ok(moved)
    }

    async fn relay(
        &self,
        outbox: &dyn OutboxStore,
        inbox: &dyn InboxStore,
    ) -> Result<usize, SagaError> {
        let claimed = outbox.claim_unprocessed(CLAIM_BATCH).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = claimed.len(), "relaying outbox records");
        let mut moved = 0;
        for record in claimed {
            let inserted = inbox.insert(InboxRecord::mirror_of(&record)).await?;
            if inserted {
                metrics::counter!("saga_records_relayed_total").increment(1);
                moved += 1;
            } else {
                tracing::warn!(
                    record_id = %record.id,
                    saga_id = %record.saga_id,
                    "inbox record already delivered, skipping"
                );
            }
        }
        Ok(moved)
    }

    /// Re-opens the inbox record of every completed step flagged for
    /// compensation.
    async fn sweep_compensating(
        &self,
        outbox: &dyn OutboxStore,
        inbox: &dyn InboxStore,
    ) -> Result<usize, SagaError> {
        let pending = outbox
            .list_by_saga_status(SagaStatus::Compensating, OutboxStatus::Completed)
            .await?;

        let mut marked = 0;
        for record in pending {
            let Some(mirrored) = inbox.find(record.id).await? else {
                tracing::error!(
                    record_id = %record.id,
                    saga_id = %record.saga_id,
                    "compensating step has no inbox record"
                );
                continue;
            };
            // Only a step the participant finished forward-processing can be
            // re-opened; Compensating/Compensated rows are already in flight.
            if mirrored.step_status == Some(StepStatus::Completed) {
                inbox
                    .set_step_status(record.id, StepStatus::Compensating)
                    .await?;
                tracing::info!(
                    record_id = %record.id,
                    saga_id = %record.saga_id,
                    "marked step for compensation"
                );
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, SagaId};
    use outbox::{InMemoryInboxStore, InMemoryOutboxStore, OutboxRecord, SagaKind};

    fn relay_with_stores() -> (
        OutboxRelay,
        Arc<InMemoryOutboxStore>,
        Arc<InMemoryInboxStore>,
    ) {
        let payment_outbox = Arc::new(InMemoryOutboxStore::new());
        let stock_outbox = Arc::new(InMemoryOutboxStore::new());
        let credit_inbox = Arc::new(InMemoryInboxStore::new());
        let stock_inbox = Arc::new(InMemoryInboxStore::new());
        let relay = OutboxRelay::new(
            payment_outbox,
            stock_outbox.clone(),
            credit_inbox,
            stock_inbox.clone(),
        );
        (relay, stock_outbox, stock_inbox)
    }

    fn record() -> OutboxRecord {
        OutboxRecord::new(
            SagaId::new(),
            OrderId::new(),
            SagaKind::OrderFulfillment,
            "{}".to_string(),
        )
    }

    #[tokio::test]
    async fn relays_unprocessed_records() {
        let (relay, stock_outbox, stock_inbox) = relay_with_stores();
        let rec = record();
        let id = rec.id;
        stock_outbox.enqueue(rec).await.unwrap();

        let moved = relay.run_once().await.unwrap();
        assert_eq!(moved, 1);

        let mirrored = stock_inbox.find(id).await.unwrap().unwrap();
        assert!(mirrored.step_status.is_none());

        // Nothing left to move.
        assert_eq!(relay.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_claim_does_not_duplicate_inbox() {
        let (relay, stock_outbox, stock_inbox) = relay_with_stores();
        let rec = record();
        stock_outbox.enqueue(rec.clone()).await.unwrap();

        relay.run_once().await.unwrap();

        // Simulate a crashed poller re-enqueueing the same step.
        stock_outbox.enqueue(rec).await.unwrap();
        let moved = relay.run_once().await.unwrap();

        assert_eq!(moved, 0);
        assert_eq!(stock_inbox.len().await, 1);
    }

    #[tokio::test]
    async fn compensation_sweep_reopens_completed_inbox_once() {
        let (relay, stock_outbox, stock_inbox) = relay_with_stores();
        let rec = record();
        let id = rec.id;
        stock_outbox.enqueue(rec).await.unwrap();
        relay.run_once().await.unwrap();

        // Forward processing finished.
        stock_inbox
            .mark_processed(id, StepStatus::Completed, OutboxStatus::Completed)
            .await
            .unwrap();
        stock_outbox
            .finalize(id, OutboxStatus::Completed, SagaStatus::Processing)
            .await
            .unwrap();

        // Listener flags the step for compensation.
        stock_outbox
            .set_saga_status(id, SagaStatus::Compensating)
            .await
            .unwrap();

        assert_eq!(relay.run_once().await.unwrap(), 1);
        let mirrored = stock_inbox.find(id).await.unwrap().unwrap();
        assert_eq!(mirrored.step_status, Some(StepStatus::Compensating));

        // The sweep is idempotent while compensation is in flight.
        assert_eq!(relay.run_once().await.unwrap(), 0);
    }
}
