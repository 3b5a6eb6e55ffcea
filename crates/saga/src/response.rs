//! Response events from participants to the saga listener.

use common::SagaId;
use outbox::StepStatus;
use tokio::sync::mpsc;

/// A participant's verdict on one saga step.
///
/// The variant identifies the participant; the listener resolves the
/// affected outbox record from the saga id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaResponse {
    /// Verdict from the inventory participant.
    StockReduction { saga_id: SagaId, status: StepStatus },

    /// Verdict from the credit participant.
    Payment { saga_id: SagaId, status: StepStatus },
}

impl SagaResponse {
    pub fn saga_id(&self) -> SagaId {
        match self {
            SagaResponse::StockReduction { saga_id, .. }
            | SagaResponse::Payment { saga_id, .. } => *saga_id,
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            SagaResponse::StockReduction { status, .. }
            | SagaResponse::Payment { status, .. } => *status,
        }
    }
}

/// Creates the channel connecting participants to the listener.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResponseSender(tx), ResponseReceiver(rx))
}

/// Sending half, cloned into every participant manager.
#[derive(Clone)]
pub struct ResponseSender(mpsc::UnboundedSender<SagaResponse>);

impl ResponseSender {
    /// Publishes a response event.
    ///
    /// A closed channel means the listener is gone; the event is logged and
    /// dropped rather than failing the participant's transaction.
    pub fn publish(&self, response: SagaResponse) {
        if self.0.send(response).is_err() {
            tracing::error!(?response, "response listener is gone, dropping event");
        }
    }
}

/// Receiving half, owned by the listener loop.
pub struct ResponseReceiver(mpsc::UnboundedReceiver<SagaResponse>);

impl ResponseReceiver {
    /// Waits for the next response event.
    pub async fn recv(&mut self) -> Option<SagaResponse> {
        self.0.recv().await
    }

    /// Returns the next buffered response event, if any.
    pub fn try_recv(&mut self) -> Option<SagaResponse> {
        self.0.try_recv().ok()
    }
}
