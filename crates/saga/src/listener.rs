//! Saga response listener: the only component that couples saga progress to
//! order state.
//!
//! Participants stay ignorant of the overall workflow; they mutate their own
//! ledger and report a verdict. This listener turns those verdicts into
//! order transitions and follow-up steps: advance and enqueue the next step
//! on success, flag completed prior steps for compensation on failure.

use std::sync::Arc;

use common::SagaId;
use domain::{OrderService, OrderStore};
use outbox::{OutboxRecord, OutboxStatus, OutboxStore, SagaKind, SagaStatus, StepStatus};

use crate::error::SagaError;
use crate::payload::{PaymentPayload, StockReductionPayload};
use crate::response::{ResponseReceiver, SagaResponse};

pub struct SagaResponseListener<S: OrderStore> {
    orders: Arc<OrderService<S>>,
    payment_outbox: Arc<dyn OutboxStore>,
    stock_outbox: Arc<dyn OutboxStore>,
}

impl<S: OrderStore> SagaResponseListener<S> {
    pub fn new(
        orders: Arc<OrderService<S>>,
        payment_outbox: Arc<dyn OutboxStore>,
        stock_outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            orders,
            payment_outbox,
            stock_outbox,
        }
    }

    /// Consumes response events until every sender is gone.
    pub async fn run(&self, mut responses: ResponseReceiver) {
        while let Some(response) = responses.recv().await {
            if let Err(err) = self.handle(response).await {
                tracing::error!(%err, ?response, "failed to handle saga response");
            }
        }
        tracing::info!("response channel closed, listener stopping");
    }

    /// Reacts to one participant verdict.
    #[tracing::instrument(skip(self), fields(saga_id = %response.saga_id()))]
    pub async fn handle(&self, response: SagaResponse) -> Result<(), SagaError> {
        match response.status() {
            StepStatus::Completed => self.on_completed(response).await,
            StepStatus::Failed => self.on_failed(response).await,
            StepStatus::Compensated => self.on_compensated(response).await,
            // Participants never report an in-flight compensation.
            StepStatus::Compensating => {
                tracing::warn!("unexpected in-flight compensation response, dropping");
                Ok(())
            }
        }
    }

    async fn on_completed(&self, response: SagaResponse) -> Result<(), SagaError> {
        let outbox = self.outbox_for(&response);
        let Some(record) = self.claimed_record(outbox, response.saga_id()).await? else {
            return Ok(());
        };

        match (record.kind, &response) {
            // Fulfillment: stock reserved, payment is next.
            (SagaKind::OrderFulfillment, SagaResponse::StockReduction { .. }) => {
                outbox
                    .finalize(record.id, OutboxStatus::Completed, SagaStatus::Processing)
                    .await?;
                let order = self
                    .orders
                    .apply(record.order_id, |o| o.mark_reservation_accepted())
                    .await?;
                let payload = PaymentPayload::new(order.user_id(), order.total_price());
                self.payment_outbox
                    .enqueue(OutboxRecord::new(
                        record.saga_id,
                        record.order_id,
                        record.kind,
                        payload.to_json()?,
                    ))
                    .await?;
                tracing::info!(order_id = %record.order_id, "stock reserved, payment step enqueued");
            }

            // Fulfillment: payment accepted, the saga is done.
            (SagaKind::OrderFulfillment, SagaResponse::Payment { .. }) => {
                outbox
                    .finalize(record.id, OutboxStatus::Completed, SagaStatus::Succeeded)
                    .await?;
                self.mark_completed_steps(self.stock_outbox.as_ref(), record.saga_id, SagaStatus::Succeeded)
                    .await?;
                self.orders
                    .apply(record.order_id, |o| o.mark_payment_accepted())
                    .await?;
                metrics::counter!("sagas_fulfilled_total").increment(1);
                tracing::info!(order_id = %record.order_id, "order fulfilled");
            }

            // Cancellation: payment refunded, stock restore is next.
            (SagaKind::OrderCancellation, SagaResponse::Payment { .. }) => {
                outbox
                    .finalize(record.id, OutboxStatus::Completed, SagaStatus::Processing)
                    .await?;
                let order = self.orders.get(record.order_id).await?;
                let payload = StockReductionPayload::from_order(&order);
                self.stock_outbox
                    .enqueue(OutboxRecord::new(
                        record.saga_id,
                        record.order_id,
                        record.kind,
                        payload.to_json()?,
                    ))
                    .await?;
                tracing::info!(order_id = %record.order_id, "payment refunded, stock restore enqueued");
            }

            // Cancellation: stock restored, the saga is done.
            (SagaKind::OrderCancellation, SagaResponse::StockReduction { .. }) => {
                outbox
                    .finalize(record.id, OutboxStatus::Completed, SagaStatus::Succeeded)
                    .await?;
                self.mark_completed_steps(self.payment_outbox.as_ref(), record.saga_id, SagaStatus::Succeeded)
                    .await?;
                self.orders.apply(record.order_id, |o| o.cancel()).await?;
                metrics::counter!("sagas_cancelled_total").increment(1);
                tracing::info!(order_id = %record.order_id, "order cancelled");
            }
        }
        Ok(())
    }

    async fn on_failed(&self, response: SagaResponse) -> Result<(), SagaError> {
        let outbox = self.outbox_for(&response);
        let Some(record) = self.claimed_record(outbox, response.saga_id()).await? else {
            return Ok(());
        };

        outbox
            .finalize(record.id, OutboxStatus::Failed, SagaStatus::Failed)
            .await?;

        match record.kind {
            SagaKind::OrderFulfillment => {
                // Flag already-completed prior steps for the compensation
                // sweep. Stock is the first step, so only a payment failure
                // leaves anything to reverse.
                if matches!(response, SagaResponse::Payment { .. }) {
                    self.mark_completed_steps(
                        self.stock_outbox.as_ref(),
                        record.saga_id,
                        SagaStatus::Compensating,
                    )
                    .await?;
                }
                let reason = match response {
                    SagaResponse::StockReduction { .. } => "stock reservation failed",
                    SagaResponse::Payment { .. } => "payment failed",
                };
                self.orders
                    .apply(record.order_id, |o| o.mark_failed(reason))
                    .await?;
                metrics::counter!("sagas_failed_total").increment(1);
                tracing::warn!(order_id = %record.order_id, reason, "order failed");
            }
            SagaKind::OrderCancellation => {
                // Failing the whole order would destroy its fulfilled state;
                // the order stays in CancelRequested for the operator.
                metrics::counter!("saga_cancellations_stalled_total").increment(1);
                tracing::error!(
                    order_id = %record.order_id,
                    "cancellation step failed, order needs operator attention"
                );
            }
        }
        Ok(())
    }

    async fn on_compensated(&self, response: SagaResponse) -> Result<(), SagaError> {
        let outbox = self.outbox_for(&response);
        let records = outbox.list_by_saga(response.saga_id()).await?;
        let Some(record) = records
            .into_iter()
            .find(|r| r.saga_status == SagaStatus::Compensating)
        else {
            tracing::debug!("no step awaiting compensation bookkeeping, dropping duplicate");
            return Ok(());
        };

        outbox
            .set_saga_status(record.id, SagaStatus::Compensated)
            .await?;
        metrics::counter!("saga_steps_compensated_total").increment(1);
        tracing::info!(order_id = %record.order_id, "step compensation recorded");
        // The order was already marked failed when compensation was
        // triggered; nothing further to advance.
        Ok(())
    }

    /// Looks up the saga's in-flight record; a miss means the response is a
    /// duplicate or out-of-order delivery.
    async fn claimed_record(
        &self,
        outbox: &dyn OutboxStore,
        saga_id: SagaId,
    ) -> Result<Option<OutboxRecord>, SagaError> {
        let record = outbox
            .find_by_saga_and_status(saga_id, OutboxStatus::Started)
            .await?;
        if record.is_none() {
            metrics::counter!("saga_duplicate_responses_total").increment(1);
            tracing::warn!("no claimed record for response, dropping duplicate");
        }
        Ok(record)
    }

    /// Moves every completed step of the saga to `target` workflow status.
    ///
    /// Newest step first, so a multi-step compensation unwinds in reverse
    /// order of execution.
    async fn mark_completed_steps(
        &self,
        outbox: &dyn OutboxStore,
        saga_id: SagaId,
        target: SagaStatus,
    ) -> Result<(), SagaError> {
        let records = outbox.list_by_saga(saga_id).await?;
        for record in records.iter().rev() {
            if record.outbox_status == Some(OutboxStatus::Completed) && record.saga_status != target
            {
                outbox.set_saga_status(record.id, target).await?;
            }
        }
        Ok(())
    }

    fn outbox_for(&self, response: &SagaResponse) -> &dyn OutboxStore {
        match response {
            SagaResponse::StockReduction { .. } => self.stock_outbox.as_ref(),
            SagaResponse::Payment { .. } => self.payment_outbox.as_ref(),
        }
    }
}
