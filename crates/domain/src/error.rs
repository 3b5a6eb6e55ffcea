use common::{Money, OrderId, ProductId, UserId};
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors produced by the order aggregate and its store.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested transition is not allowed from the current status.
    #[error("cannot {action} an order in {from} status")]
    InvalidStateTransition {
        from: OrderStatus,
        action: &'static str,
    },

    /// The declared total does not match the sum of the item prices.
    #[error("declared total {declared} does not match item total {computed}")]
    PriceMismatch { declared: Money, computed: Money },

    /// An order must contain at least one item.
    #[error("order has no items")]
    NoItems,

    /// An item quantity must be positive.
    #[error("invalid quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    /// An item unit price must be positive.
    #[error("invalid unit price: {price}")]
    InvalidPrice { price: Money },

    /// The order was not found.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The order was modified concurrently; the caller should retry.
    #[error("order {0} was modified concurrently")]
    Conflict(OrderId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors produced by the resource ledgers and their stores.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The balance cannot cover the requested debit.
    #[error("insufficient balance for user {user_id}: have {available}, need {requested}")]
    InsufficientBalance {
        user_id: UserId,
        available: Money,
        requested: Money,
    },

    /// The stock level cannot cover the requested decrement.
    #[error("insufficient stock for product {product_id}: have {available}, need {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// Ledger mutations require a positive amount.
    #[error("amount must be positive: {0}")]
    NonPositiveAmount(Money),

    /// Ledger mutations require a positive quantity.
    #[error("quantity must be positive")]
    NonPositiveQuantity,

    /// No credit account exists for the user.
    #[error("credit account not found for user {0}")]
    CreditNotFound(UserId),

    /// No stock row exists for the product.
    #[error("stock not found for product {0}")]
    StockNotFound(ProductId),

    /// The optimistic version check failed; the caller should retry.
    #[error("concurrent modification of {0}")]
    Conflict(String),

    /// A row already exists for the resource.
    #[error("ledger row already exists for {0}")]
    AlreadyExists(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded into its in-memory shape.
    #[error("invalid stored value: {0}")]
    Decode(String),
}

impl LedgerError {
    /// True for transient conflicts worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    /// True for domain rejections that fail the saga step (as opposed to
    /// transient conflicts or infrastructure errors).
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientBalance { .. }
                | LedgerError::InsufficientStock { .. }
                | LedgerError::NonPositiveAmount(_)
                | LedgerError::NonPositiveQuantity
                | LedgerError::CreditNotFound(_)
                | LedgerError::StockNotFound(_)
        )
    }
}
