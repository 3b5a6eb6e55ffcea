//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{LedgerError, OrderError};
use saga::SagaError;
use thiserror::Error;

/// API-level error that maps onto an HTTP status and a JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request input, rejected before touching any service.
    #[error("{0}")]
    BadRequest(String),

    /// Error from the saga command/query surface.
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// Error from the order service.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Error from a ledger service.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Order(err) => order_status(err),
            ApiError::Ledger(err) => ledger_status(err),
            ApiError::Saga(SagaError::Order(err)) => order_status(err),
            ApiError::Saga(SagaError::Ledger(err)) => ledger_status(err),
            ApiError::Saga(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidStateTransition { .. } | OrderError::Conflict(_) => StatusCode::CONFLICT,
        OrderError::PriceMismatch { .. }
        | OrderError::NoItems
        | OrderError::InvalidQuantity { .. }
        | OrderError::InvalidPrice { .. } => StatusCode::BAD_REQUEST,
        OrderError::Database(_) | OrderError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::CreditNotFound(_) | LedgerError::StockNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientBalance { .. } | LedgerError::InsufficientStock { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::NonPositiveAmount(_) | LedgerError::NonPositiveQuantity => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Conflict(_) | LedgerError::AlreadyExists(_) => StatusCode::CONFLICT,
        LedgerError::Database(_) | LedgerError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId, UserId};

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::Order(OrderError::NotFound(OrderId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = ApiError::Order(OrderError::NoItems);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn state_transition_maps_to_409() {
        let err = ApiError::Order(OrderError::InvalidStateTransition {
            from: domain::OrderStatus::StockPending,
            action: "cancel",
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn insufficient_balance_maps_to_422() {
        let err = ApiError::Ledger(LedgerError::InsufficientBalance {
            user_id: UserId::new(1),
            available: Money::from_cents(100),
            requested: Money::from_cents(200),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn wrapped_saga_errors_keep_their_mapping() {
        let err = ApiError::Saga(SagaError::Order(OrderError::NotFound(OrderId::new())));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
