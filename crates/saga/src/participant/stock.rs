//! Inventory participant: processes stock reservation steps against
//! per-product levels.

use std::sync::Arc;

use domain::{StockHistoryStore, StockService, StockStore};
use outbox::{InboxRecord, InboxStore, OutboxStatus, SagaKind, StepStatus};

use crate::error::SagaError;
use crate::payload::StockReductionPayload;
use crate::response::{ResponseSender, SagaResponse};

use super::FETCH_BATCH;

/// Consumes the inventory inbox: reserves stock for fulfillment steps,
/// restores it for cancellation steps, and reverses its own reservations
/// when compensating.
///
/// Multi-item steps are all-or-nothing: the ledger locks every row before
/// mutating any, so a partially available cart never commits a partial
/// decrement.
pub struct StockOutboxManager<S, H>
where
    S: StockStore,
    H: StockHistoryStore,
{
    inbox: Arc<dyn InboxStore>,
    stocks: Arc<StockService<S, H>>,
    responses: ResponseSender,
}

impl<S, H> StockOutboxManager<S, H>
where
    S: StockStore,
    H: StockHistoryStore,
{
    pub fn new(
        inbox: Arc<dyn InboxStore>,
        stocks: Arc<StockService<S, H>>,
        responses: ResponseSender,
    ) -> Self {
        Self {
            inbox,
            stocks,
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

    /// Applies one inbox record to the stock ledger.
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

        let payload = match StockReductionPayload::from_json(&current.payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%err, "malformed stock payload");
                return self.reject(&current).await;
            }
        };

        let result = match current.kind {
            SagaKind::OrderFulfillment => self.stocks.sell(payload.to_adjustments()).await,
            SagaKind::OrderCancellation => self.stocks.restock(payload.to_adjustments()).await,
        };

        match result {
            Ok(()) => {
                self.inbox
                    .mark_processed(current.id, StepStatus::Completed, OutboxStatus::Completed)
                    .await?;
                metrics::counter!("saga_stock_steps_completed").increment(1);
                tracing::info!(item_count = payload.items.len(), "stock step completed");
                self.responses.publish(SagaResponse::StockReduction {
                    saga_id: current.saga_id,
                    status: StepStatus::Completed,
                });
                Ok(1)
            }
            Err(err) if err.is_business_rule() => {
                tracing::warn!(%err, "stock step rejected");
                self.reject(&current).await
            }
            Err(err) if err.is_retryable() => {
                // Nothing was committed; the record stays unprocessed and a
                // later sweep retries it.
                tracing::warn!(%err, "stock step hit lock contention, will retry");
                Ok(0)
            }
            Err(err) => {
                tracing::error!(%err, "stock step infrastructure error");
                Ok(0)
            }
        }
    }

    /// Reverses a completed stock step using the same payload.
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

        let payload = match StockReductionPayload::from_json(&current.payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%err, "malformed stock payload during compensation");
                return Ok(0);
            }
        };

        let result = match current.kind {
            SagaKind::OrderFulfillment => self.stocks.restock(payload.to_adjustments()).await,
            SagaKind::OrderCancellation => self.stocks.sell(payload.to_adjustments()).await,
        };

        match result {
            Ok(()) => {
                self.inbox
                    .set_step_status(current.id, StepStatus::Compensated)
                    .await?;
                metrics::counter!("saga_stock_steps_compensated").increment(1);
                tracing::info!(item_count = payload.items.len(), "stock step compensated");
                self.responses.publish(SagaResponse::StockReduction {
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
                tracing::error!(%err, "stock compensation failed");
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
        metrics::counter!("saga_stock_steps_failed").increment(1);
        tracing::warn!(
            record_id = %record.id,
            saga_id = %record.saga_id,
            "stock step failed"
        );
        self.responses.publish(SagaResponse::StockReduction {
            saga_id: record.saga_id,
            status: StepStatus::Failed,
        });
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, ProductId, SagaId};
    use domain::{InMemoryStockHistoryStore, InMemoryStockStore};
    use outbox::{InMemoryInboxStore, OutboxRecord};

    use crate::payload::StockReductionItem;
    use crate::response::response_channel;

    type Manager = StockOutboxManager<InMemoryStockStore, InMemoryStockHistoryStore>;

    async fn setup(levels: &[(i64, u32)]) -> (Manager, Arc<InMemoryInboxStore>, crate::ResponseReceiver)
    {
        let inbox = Arc::new(InMemoryInboxStore::new());
        let stocks = Arc::new(StockService::new(
            InMemoryStockStore::new(),
            InMemoryStockHistoryStore::new(),
        ));
        for (product, quantity) in levels {
            stocks
                .register(ProductId::new(*product), *quantity)
                .await
                .unwrap();
        }

        let (tx, rx) = response_channel();
        let manager = StockOutboxManager::new(inbox.clone(), stocks, tx);
        (manager, inbox, rx)
    }

    async fn deliver(
        inbox: &InMemoryInboxStore,
        kind: SagaKind,
        items: Vec<(i64, u32)>,
    ) -> InboxRecord {
        let payload = StockReductionPayload {
            items: items
                .into_iter()
                .map(|(product, quantity)| StockReductionItem {
                    product_id: ProductId::new(product),
                    quantity,
                })
                .collect(),
        }
        .to_json()
        .unwrap();
        let outbox = OutboxRecord::new(SagaId::new(), OrderId::new(), kind, payload);
        let record = InboxRecord::mirror_of(&outbox);
        inbox.insert(record.clone()).await.unwrap();
        record
    }

    #[tokio::test]
    async fn reserves_and_completes_fulfillment_step() {
        let (manager, inbox, mut rx) = setup(&[(1, 10)]).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, vec![(1, 2)]).await;

        assert_eq!(manager.run_once().await.unwrap(), 1);

        let stored = inbox.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.step_status, Some(StepStatus::Completed));
        assert_eq!(stored.outbox_status, Some(OutboxStatus::Completed));
        assert!(stored.processed_at.is_some());
        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 8);

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StepStatus::Completed);
    }

    #[tokio::test]
    async fn insufficient_stock_fails_after_two_sweeps() {
        let (manager, inbox, mut rx) = setup(&[(1, 1)]).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, vec![(1, 5)]).await;

        // One sweep records the rejection and its failure follow-up.
        assert_eq!(manager.run_once().await.unwrap(), 2);

        let stored = inbox.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.step_status, Some(StepStatus::Failed));
        assert_eq!(stored.outbox_status, Some(OutboxStatus::Failed));
        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 1);

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StepStatus::Failed);
    }

    #[tokio::test]
    async fn partial_availability_commits_nothing() {
        let (manager, inbox, mut rx) = setup(&[(1, 10), (2, 1)]).await;
        deliver(&inbox, SagaKind::OrderFulfillment, vec![(1, 3), (2, 5)]).await;

        manager.run_once().await.unwrap();

        // The first item had plenty of stock, but the step is atomic.
        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 10);
        assert_eq!(manager.stocks.level(ProductId::new(2)).await.unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Failed);
    }

    #[tokio::test]
    async fn redelivery_of_completed_record_does_not_decrement_twice() {
        let (manager, inbox, _rx) = setup(&[(1, 10)]).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, vec![(1, 2)]).await;

        manager.run_once().await.unwrap();
        assert_eq!(manager.process(&record).await.unwrap(), 0);

        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn compensation_restores_once() {
        let (manager, inbox, mut rx) = setup(&[(1, 10)]).await;
        let record = deliver(&inbox, SagaKind::OrderFulfillment, vec![(1, 2)]).await;

        manager.run_once().await.unwrap();
        let _ = rx.try_recv();

        inbox
            .set_step_status(record.id, StepStatus::Compensating)
            .await
            .unwrap();

        assert_eq!(manager.run_once().await.unwrap(), 1);
        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 10);
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Compensated);

        // Compensation twice yields the same restored value.
        assert_eq!(manager.compensate(&record).await.unwrap(), 0);
        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn cancellation_step_restores_stock() {
        let (manager, inbox, mut rx) = setup(&[(1, 8)]).await;
        deliver(&inbox, SagaKind::OrderCancellation, vec![(1, 2)]).await;

        manager.run_once().await.unwrap();

        assert_eq!(manager.stocks.level(ProductId::new(1)).await.unwrap(), 10);
        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Completed);
    }

    #[tokio::test]
    async fn missing_product_fails_the_step() {
        let (manager, inbox, mut rx) = setup(&[(1, 10)]).await;
        deliver(&inbox, SagaKind::OrderFulfillment, vec![(404, 1)]).await;

        manager.run_once().await.unwrap();
        manager.run_once().await.unwrap();

        assert_eq!(rx.try_recv().unwrap().status(), StepStatus::Failed);
    }
}
