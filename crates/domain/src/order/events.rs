//! Order domain events.
//!
//! Registered by the aggregate on each status transition, collected on the
//! instance, and drained exactly once when the transition commits.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// Events registered by order status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed and entered the fulfillment saga.
    OrderPlaced {
        order_id: OrderId,
        user_id: UserId,
        total_price: Money,
        item_count: usize,
        occurred_at: DateTime<Utc>,
    },

    /// The inventory step succeeded.
    ReservationAccepted {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },

    /// The payment step succeeded; the order is fulfilled.
    PaymentAccepted {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },

    /// A saga step failed and the order was marked failed.
    OrderFailed {
        order_id: OrderId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    /// Cancellation was requested for a fulfilled order.
    CancelRequested {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },

    /// The cancellation saga finished.
    OrderCancelled {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },
}

impl OrderEvent {
    /// Returns the event type name, used for logging and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced { .. } => "OrderPlaced",
            OrderEvent::ReservationAccepted { .. } => "ReservationAccepted",
            OrderEvent::PaymentAccepted { .. } => "PaymentAccepted",
            OrderEvent::OrderFailed { .. } => "OrderFailed",
            OrderEvent::CancelRequested { .. } => "CancelRequested",
            OrderEvent::OrderCancelled { .. } => "OrderCancelled",
        }
    }

    /// Returns the id of the order the event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced { order_id, .. }
            | OrderEvent::ReservationAccepted { order_id, .. }
            | OrderEvent::PaymentAccepted { order_id, .. }
            | OrderEvent::OrderFailed { order_id, .. }
            | OrderEvent::CancelRequested { order_id, .. }
            | OrderEvent::OrderCancelled { order_id, .. } => *order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let order_id = OrderId::new();
        let event = OrderEvent::OrderPlaced {
            order_id,
            user_id: UserId::new(1),
            total_price: Money::from_cents(2000),
            item_count: 2,
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "OrderPlaced");
        assert_eq!(event.order_id(), order_id);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let event = OrderEvent::OrderFailed {
            order_id: OrderId::new(),
            reason: "insufficient stock".to_string(),
            occurred_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("OrderFailed"));

        let back: OrderEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "OrderFailed");
    }
}
