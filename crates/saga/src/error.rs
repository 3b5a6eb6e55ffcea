use domain::{LedgerError, OrderError};
use outbox::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Order aggregate or store error.
    #[error("order error: {0}")]
    Order(#[from] OrderError),

    /// Resource ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Relay store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A step payload could not be serialized or deserialized.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
