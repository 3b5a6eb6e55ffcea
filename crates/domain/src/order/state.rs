//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// StockPending ──► PaymentPending ──► Fulfilled ──► CancelRequested ──► Cancelled
///       │                 │                                  │
///       └─────────────────┴──► Failed ◄─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Waiting for the inventory step of the fulfillment saga.
    #[default]
    StockPending,

    /// Stock reserved, waiting for the payment step.
    PaymentPending,

    /// Both saga steps succeeded.
    Fulfilled,

    /// A saga step failed; compensation has run or is running (terminal).
    Failed,

    /// Cancellation saga in flight for a fulfilled order.
    CancelRequested,

    /// Cancellation saga finished (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the stock reservation can be accepted in this status.
    pub fn can_accept_reservation(&self) -> bool {
        matches!(self, OrderStatus::StockPending)
    }

    /// Returns true if the payment can be accepted in this status.
    pub fn can_accept_payment(&self) -> bool {
        matches!(self, OrderStatus::PaymentPending)
    }

    /// Returns true if the order can be marked failed in this status.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            OrderStatus::StockPending | OrderStatus::PaymentPending | OrderStatus::CancelRequested
        )
    }

    /// Returns true if cancellation can be requested in this status.
    pub fn can_request_cancel(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled)
    }

    /// Returns true if the cancellation can be finished in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::CancelRequested)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::StockPending => "StockPending",
            OrderStatus::PaymentPending => "PaymentPending",
            OrderStatus::Fulfilled => "Fulfilled",
            OrderStatus::Failed => "Failed",
            OrderStatus::CancelRequested => "CancelRequested",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "StockPending" => Some(OrderStatus::StockPending),
            "PaymentPending" => Some(OrderStatus::PaymentPending),
            "Fulfilled" => Some(OrderStatus::Fulfilled),
            "Failed" => Some(OrderStatus::Failed),
            "CancelRequested" => Some(OrderStatus::CancelRequested),
            "Cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_stock_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::StockPending);
    }

    #[test]
    fn test_can_accept_reservation() {
        assert!(OrderStatus::StockPending.can_accept_reservation());
        assert!(!OrderStatus::PaymentPending.can_accept_reservation());
        assert!(!OrderStatus::Fulfilled.can_accept_reservation());
        assert!(!OrderStatus::Failed.can_accept_reservation());
    }

    #[test]
    fn test_can_accept_payment() {
        assert!(!OrderStatus::StockPending.can_accept_payment());
        assert!(OrderStatus::PaymentPending.can_accept_payment());
        assert!(!OrderStatus::Fulfilled.can_accept_payment());
    }

    #[test]
    fn test_can_fail_from_non_fulfilled_states() {
        assert!(OrderStatus::StockPending.can_fail());
        assert!(OrderStatus::PaymentPending.can_fail());
        assert!(OrderStatus::CancelRequested.can_fail());
        assert!(!OrderStatus::Fulfilled.can_fail());
        assert!(!OrderStatus::Failed.can_fail());
        assert!(!OrderStatus::Cancelled.can_fail());
    }

    #[test]
    fn test_cancel_path() {
        assert!(OrderStatus::Fulfilled.can_request_cancel());
        assert!(!OrderStatus::StockPending.can_request_cancel());
        assert!(OrderStatus::CancelRequested.can_cancel());
        assert!(!OrderStatus::Fulfilled.can_cancel());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Fulfilled.is_terminal());
        assert!(!OrderStatus::StockPending.is_terminal());
    }

    #[test]
    fn test_string_roundtrip() {
        for status in [
            OrderStatus::StockPending,
            OrderStatus::PaymentPending,
            OrderStatus::Fulfilled,
            OrderStatus::Failed,
            OrderStatus::CancelRequested,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("Unknown"), None);
    }
}
