//! Credit participant: processes payment steps against the user's balance.

use std::sync::Arc;

use domain::{CreditChangeReason, CreditHistoryStore, CreditService, CreditStore};
use outbox::{InboxRecord, InboxStore, OutboxStatus, SagaKind, StepStatus};

use crate::error::SagaError;
use crate::payload::PaymentPayload;
use crate::response::{ResponseSender, SagaResponse};

use super::FETCH_BATCH;

/// Consumes the credit inbox: debits for fulfillment steps, refunds for
/// cancellation steps, and reverses its own debits when compensating.
pub struct CreditOutboxManager<S, H>
where
    S: CreditStore,
    H: CreditHistoryStore,
{
    inbox: Arc<dyn InboxStore>,
    credits: Arc<CreditService<S, H>>,
    responses: ResponseSender,
}

impl<S, H> CreditOutboxManager<S, H>
where
    S: CreditStore,
    H: CreditHistoryStore,
{
    pub fn new(
        inbox: Arc<dyn InboxStore>,
        credits: Arc<CreditService<S, H>>,
        responses: ResponseSender,
    ) -> Self {
        Self {
            inbox,
            credits,
            responses,
        }
    }

    /// Runs one sweep: fresh records, then the failure and compensation
    /// follow-ups. Returns the number of records that changed state.
    pub async fn run_once(&self) -> Result<usize, SagaError> {
        let mut touched = 0;

        for record in self.inbox.fetch_unprocessed(FETCH_BATCH).await? {
            touched += self.process(&record).await?;
        }

        for record in self
            .inbox
            .fetch_by_step_status(StepStatus::Failed, FETCH_BATCH)
            .await?
        {
            if record.outbox_status == Some(OutboxStatus::Started) {
                touched += self.finalize_failure(&record).await?;
            }
        }

        for record in self
            .inbox
            .fetch_by_step_status(StepStatus::Compensating, FETCH_BATCH)
            .await?
        {
            touched += self.compensate(&record).await?;
        }

        Ok(touched)
    }

    /// Applies one inbox record to the credit ledger.
    #[tracing::instrument(skip(self, record), fields(record_id = %record.id, saga_id = %record.saga_id))]
    pub async fn process(&self, record: &InboxRecord) -> Result<usize, SagaError> {
        // Re-read: a second delivery of an already-handled record is a no-op.
        let Some(current) = self.inbox.find(record.id).await? else {
            tracing::error!("inbox record vanished");
            return Ok(0);
        };
        if current.outbox_status.is_some() || current.step_status.is_some() {
            tracing::debug!("record already handled, skipping");
            return Ok(0);
        }

        let payload = match PaymentPayload::from_json(&current.payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%err, "malformed payment payload");
                return self.reject(&current).await;
            }
        };

        let result = match current.kind {
            SagaKind::OrderFulfillment => {
                self.credits
                    .debit(
                        payload.user_id,
                        payload.amount(),
                        CreditChangeReason::OrderPayment,
                    )
                    .await
            }
            SagaKind::OrderCancellation => {
                self.credits
                    .credit(
                        payload.user_id,
                        payload.amount(),
                        CreditChangeReason::OrderRefund,
                    )
                    .await
            }
        };

        match result {
            Ok(()) => {
                self.inbox
                    .mark_processed(current.id, StepStatus::Completed, OutboxStatus::Completed)
                    .await?;
                metrics::counter!("saga_payment_steps_completed").increment(1);
                tracing::info!(user_id = %payload.user_id, "payment step completed");
                self.responses.publish(SagaResponse::Payment {
                    saga_id: current.saga_id,
                    status: StepStatus::Completed,
                });
                Ok(1)
            }
            Err(err) if err.is_business_rule() => {
                tracing::warn!(%err, "payment step rejected");
                self.reject(&current).await
            }
            Err(err) if err.is_retryable() => {
                // Nothing was committed; the record stays unprocessed and a
                // later sweep retries it.
                tracing::warn!(%err, "payment step hit lock contention, will retry");
                Ok(0)
            }
            Err(err) => {
                tracing::error!(%err, "payment step infrastructure error");
                Ok(0)
            }
        }
    }

    /// Reverses a completed payment step using the same payload.
    #[tracing::instrument(skip(self, record), fields(record_id = %record.id, saga_id = %record.saga_id))]
    pub async fn compensate(&self, record: &InboxRecord) -> Result<usize, SagaError> {
        let Some(current) = self.inbox.find(record.id).await? else {
            tracing::error!("inbox record vanished");
            return Ok(0);
        };
        // Running compensation twice must not move the ledger twice.
        if current.step_status != Some(StepStatus::Compensating) {
            tracing::debug!("record not awaiting compensation, skipping");
            return Ok(0);
        }

        let payload = match PaymentPayload::from_json(&current.payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%err, "malformed payment payload during compensation");
                return Ok(0);
            }
        };

        let result = match current.kind {
            SagaKind::OrderFulfillment => {
                self.credits
                    .credit(
                        payload.user_id,
                        payload.amount(),
                        CreditChangeReason::OrderRefund,
                    )
                    .await
            }
            SagaKind::OrderCancellation => {
                self.credits
                    .debit(
                        payload.user_id,
                        payload.amount(),
                        CreditChangeReason::OrderPayment,
                    )
                    .await
            }
        };

        match result {
            Ok(()) => {
                self.inbox
                    .set_step_status(current.id, StepStatus::Compensated)
                    .await?;
                metrics::counter!("saga_payment_steps_compensated").increment(1);
                tracing::info!(user_id = %payload.user_id, "payment step compensated");
                self.responses.publish(SagaResponse::Payment {
                    saga_id: current.saga_id,
                    status: StepStatus::Compensated,
                });
                Ok(1)
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(%err, "compensation hit lock contention, will retry");
                Ok(0)
            }
            Err(err) => {
                // Left in Compensating for the operator; the sweep keeps
                // retrying.
                tracing::error!(%err, "payment compensation failed");
                Ok(0)
            }
        }
    }

    /// Marks a business-rule rejection; the failure sweep emits the
    /// response on its next pass.
    async fn reject(&self, record: &InboxRecord) -> Result<usize, SagaError> {
        self.inbox
            .set_step_status(record.id, StepStatus::Failed)
            .await?;
        self.inbox
            .set_outbox_status(record.id, OutboxStatus::Started)
            .await?;
        Ok(1)
    }

    /// Finalizes a rejected record and notifies the listener.
    async fn finalize_failure(&self, record: &InboxRecord) -> Result<usize, SagaError> {
        self.inbox
            .mark_processed(record.id, StepStatus::Failed, OutboxStatus::Failed)
            .await?;
        metrics::counter!("saga_payment_steps_failed").increment(1);
        tracing::warn!(
            record_id = %record.id,
            saga_id = %record.saga_id,
            "payment step failed"
        );
        self.responses.publish(SagaResponse::Payment {
            saga_id: record.saga_id,
            status: StepStatus::Failed,
        });
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId, SagaId, UserId};
    use domain::{InMemoryCreditHistoryStore, InMemoryCreditStore};
    use outbox::{InMemoryInboxStore, OutboxRecord};

    use crate::response::response_channel;

    type Manager = CreditOutboxManager<InMemoryCreditStore, InMemoryCreditHistoryStore>;

    async fn setup(balance: i64) -> (Manager, Arc<InMemoryInboxStore>, crate::ResponseReceiver) {
        let inbox = Arc::new(InMemoryInboxStore::new());
        let credits = Arc::new(CreditService::new(
            InMemoryCreditStore::new(),
            InMemoryCreditHistoryStore::new(),
        ));
        credits
            .open_account(UserId::new(1), Money::from_cents(balance))
            .await
            .unwrap();

        let (tx, rx) = response_channel();
        let manager = CreditOutboxManager::new(inbox.clone(), credits, tx);
        (manager, inbox, rx)
    }

    async fn deliver(inbox: &InMemoryInboxStore, kind: SagaKind, amount: i64) -> InboxRecord {
        let payload = PaymentPayload::new(UserId::new(1), Money::from_cents(amount))
            .to_json()
            .unwrap();
        let outbox = OutboxRecord::new(SagaId::new(), OrderId::new(), kind, payload);
        let record = InboxRecord::mirror_of(&outbox);
        inbox.insert(record.clone()).await.unwrap();
        record
    }

    #[tokio::test]
    async fn debits_and_completes_fulfillment_step() {
        let (manager, inbox, mut rx) = setup(10_000).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, 3000).await;

        assert_eq!(manager.run_once().await.unwrap(), 1);

        let stored = inbox.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.step_status, Some(StepStatus::Completed));
        assert_eq!(stored.outbox_status, Some(OutboxStatus::Completed));
        assert!(stored.processed_at.is_some());

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StepStatus::Completed);
    }

    #[tokio::test]
    async fn insufficient_balance_fails_after_two_sweeps() {
        let (manager, inbox, mut rx) = setup(500).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, 3000).await;

        // One sweep records the rejection and its failure follow-up.
        assert_eq!(manager.run_once().await.unwrap(), 2);

        let stored = inbox.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.step_status, Some(StepStatus::Failed));
        assert_eq!(stored.outbox_status, Some(OutboxStatus::Failed));

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StepStatus::Failed);
    }

    #[tokio::test]
    async fn redelivery_of_completed_record_does_not_debit_twice() {
        let (manager, inbox, _rx) = setup(10_000).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, 3000).await;

        manager.run_once().await.unwrap();
        assert_eq!(manager.process(&record).await.unwrap(), 0);

        // Balance reflects exactly one debit.
        let balance = manager.credits.balance(UserId::new(1)).await.unwrap();
        assert_eq!(balance, Money::from_cents(7000));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_not_retried() {
        let (manager, inbox, mut rx) = setup(10_000).await;
        let outbox = OutboxRecord::new(
            SagaId::new(),
            OrderId::new(),
            SagaKind::OrderFulfillment,
            "not json".to_string(),
        );
        let record = InboxRecord::mirror_of(&outbox);
        inbox.insert(record.clone()).await.unwrap();

        manager.run_once().await.unwrap();
        manager.run_once().await.unwrap();

        let stored = inbox.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.outbox_status, Some(OutboxStatus::Failed));
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Failed);

        // No further processing attempts.
        assert_eq!(manager.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn compensation_refunds_once() {
        let (manager, inbox, mut rx) = setup(10_000).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, 3000).await;

        manager.run_once().await.unwrap();
        let _ = rx.try_recv();

        inbox
            .set_step_status(record.id, StepStatus::Compensating)
            .await
            .unwrap();

        assert_eq!(manager.run_once().await.unwrap(), 1);
        let balance = manager.credits.balance(UserId::new(1)).await.unwrap();
        assert_eq!(balance, Money::from_cents(10_000));
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Compensated);

        // Compensation twice yields the same restored value.
        assert_eq!(manager.compensate(&record).await.unwrap(), 0);
        let balance = manager.credits.balance(UserId::new(1)).await.unwrap();
        assert_eq!(balance, Money::from_cents(10_000));
    }

    #[tokio::test]
    async fn cancellation_step_refunds() {
        let (manager, inbox, mut rx) = setup(1000).await;
        deliver(&inbox, SagaKind::OrderCancellation, 3000).await;

        manager.run_once().await.unwrap();

        let balance = manager.credits.balance(UserId::new(1)).await.unwrap();
        assert_eq!(balance, Money::from_cents(4000));
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Completed);
    }

    #[tokio::test]
    async fn missing_account_fails_the_step() {
        let (manager, inbox, mut rx) = setup(10_000).await;
        let payload = PaymentPayload::new(UserId::new(999), Money::from_cents(100))
            .to_json()
            .unwrap();
        let outbox = OutboxRecord::new(
            SagaId::new(),
            OrderId::new(),
            SagaKind::OrderFulfillment,
            payload,
        );
        inbox.insert(InboxRecord::mirror_of(&outbox)).await.unwrap();

        manager.run_once().await.unwrap();
        manager.run_once().await.unwrap();

        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Failed);
    }
}
