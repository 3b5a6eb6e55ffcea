use common::RecordId;
use thiserror::Error;

/// Errors that can occur when interacting with the relay stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists with the given id.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into its in-memory shape.
    #[error("invalid stored value: {0}")]
    Decode(String),
}

/// Result type for relay store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
