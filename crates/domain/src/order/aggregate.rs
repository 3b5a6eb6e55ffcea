//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

use super::{OrderEvent, OrderStatus};

/// An item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Delivery details captured at order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub receiver_name: String,
    pub address: String,
    pub phone: String,
}

impl DeliveryInfo {
    pub fn new(
        receiver_name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            receiver_name: receiver_name.into(),
            address: address.into(),
            phone: phone.into(),
        }
    }
}

/// Order aggregate root.
///
/// Holds the forward-only status machine the saga listener drives. Every
/// transition registers a domain event on the instance; the service drains
/// them once per committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    total_price: Money,
    items: Vec<OrderItem>,
    delivery: DeliveryInfo,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped by the store on update.
    #[serde(default)]
    version: i64,

    #[serde(skip)]
    pending_events: Vec<OrderEvent>,
}

impl Order {
    /// Places a new order in `StockPending`.
    ///
    /// Rejects empty carts, non-positive quantities or prices, and a
    /// declared total that does not match the sum of the item prices.
    pub fn place(
        user_id: UserId,
        items: Vec<OrderItem>,
        delivery: DeliveryInfo,
        declared_total: Money,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    price: item.unit_price,
                });
            }
        }

        let computed: Money = items
            .iter()
            .map(OrderItem::total_price)
            .fold(Money::zero(), |acc, p| acc + p);
        if computed != declared_total {
            return Err(OrderError::PriceMismatch {
                declared: declared_total,
                computed,
            });
        }

        let id = OrderId::new();
        let created_at = Utc::now();
        let mut order = Self {
            id,
            user_id,
            status: OrderStatus::StockPending,
            total_price: declared_total,
            items,
            delivery,
            failure_reason: None,
            created_at,
            version: 0,
            pending_events: Vec::new(),
        };
        order.register(OrderEvent::OrderPlaced {
            order_id: id,
            user_id,
            total_price: declared_total,
            item_count: order.items.len(),
            occurred_at: created_at,
        });
        Ok(order)
    }

    /// Accepts the inventory reservation: `StockPending → PaymentPending`.
    pub fn mark_reservation_accepted(&mut self) -> Result<(), OrderError> {
        if !self.status.can_accept_reservation() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                action: "accept reservation for",
            });
        }
        self.status = OrderStatus::PaymentPending;
        self.register(OrderEvent::ReservationAccepted {
            order_id: self.id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Accepts the payment: `PaymentPending → Fulfilled`.
    pub fn mark_payment_accepted(&mut self) -> Result<(), OrderError> {
        if !self.status.can_accept_payment() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                action: "accept payment for",
            });
        }
        self.status = OrderStatus::Fulfilled;
        self.register(OrderEvent::PaymentAccepted {
            order_id: self.id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Marks the order failed from any non-fulfilled, non-terminal status.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        if !self.status.can_fail() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                action: "fail",
            });
        }
        let reason = reason.into();
        self.status = OrderStatus::Failed;
        self.failure_reason = Some(reason.clone());
        self.register(OrderEvent::OrderFailed {
            order_id: self.id,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Requests cancellation: `Fulfilled → CancelRequested`.
    pub fn request_cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_request_cancel() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                action: "request cancellation of",
            });
        }
        self.status = OrderStatus::CancelRequested;
        self.register(OrderEvent::CancelRequested {
            order_id: self.id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Finishes cancellation: `CancelRequested → Cancelled`.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        self.register(OrderEvent::OrderCancelled {
            order_id: self.id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Rehydrates an order from its persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_row(
        id: OrderId,
        user_id: UserId,
        status: OrderStatus,
        total_price: Money,
        items: Vec<OrderItem>,
        delivery: DeliveryInfo,
        failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        version: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            status,
            total_price,
            items,
            delivery,
            failure_reason,
            created_at,
            version,
            pending_events: Vec::new(),
        }
    }

    fn register(&mut self, event: OrderEvent) {
        self.pending_events.push(event);
    }

    /// Drains the events registered since the last drain.
    ///
    /// Collect-then-clear: a second call returns nothing, so a committed
    /// transition publishes its events exactly once.
    pub fn take_events(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> DeliveryInfo {
        DeliveryInfo::new("Jordan Doe", "1 Main St", "555-0100")
    }

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem::new(1, "Widget", 2, Money::from_cents(1000)),
            OrderItem::new(2, "Gadget", 1, Money::from_cents(1000)),
        ]
    }

    fn placed_order() -> Order {
        Order::place(UserId::new(1), items(), delivery(), Money::from_cents(3000)).unwrap()
    }

    #[test]
    fn test_place_order() {
        let mut order = placed_order();
        assert_eq!(order.status(), OrderStatus::StockPending);
        assert_eq!(order.total_price(), Money::from_cents(3000));
        assert_eq!(order.items().len(), 2);
        assert!(order.failure_reason().is_none());

        let events = order.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "OrderPlaced");
    }

    #[test]
    fn test_place_rejects_empty_cart() {
        let result = Order::place(UserId::new(1), vec![], delivery(), Money::zero());
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn test_place_rejects_price_mismatch() {
        let result = Order::place(UserId::new(1), items(), delivery(), Money::from_cents(2999));
        assert!(matches!(result, Err(OrderError::PriceMismatch { .. })));
    }

    #[test]
    fn test_place_rejects_zero_quantity() {
        let bad = vec![OrderItem::new(1, "Widget", 0, Money::from_cents(1000))];
        let result = Order::place(UserId::new(1), bad, delivery(), Money::zero());
        assert!(matches!(
            result,
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn test_place_rejects_zero_price() {
        let bad = vec![OrderItem::new(1, "Widget", 1, Money::zero())];
        let result = Order::place(UserId::new(1), bad, delivery(), Money::zero());
        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_full_fulfillment_lifecycle() {
        let mut order = placed_order();
        order.take_events();

        order.mark_reservation_accepted().unwrap();
        assert_eq!(order.status(), OrderStatus::PaymentPending);

        order.mark_payment_accepted().unwrap();
        assert_eq!(order.status(), OrderStatus::Fulfilled);

        let events = order.take_events();
        let types: Vec<_> = events.iter().map(OrderEvent::event_type).collect();
        assert_eq!(types, vec!["ReservationAccepted", "PaymentAccepted"]);
    }

    #[test]
    fn test_payment_cannot_precede_reservation() {
        let mut order = placed_order();
        let result = order.mark_payment_accepted();
        assert!(matches!(
            result,
            Err(OrderError::InvalidStateTransition { .. })
        ));
        assert_eq!(order.status(), OrderStatus::StockPending);
    }

    #[test]
    fn test_mark_failed_records_reason() {
        let mut order = placed_order();
        order.mark_failed("insufficient stock").unwrap();

        assert_eq!(order.status(), OrderStatus::Failed);
        assert_eq!(order.failure_reason(), Some("insufficient stock"));
        assert!(order.is_terminal());
    }

    #[test]
    fn test_cannot_fail_fulfilled_order() {
        let mut order = placed_order();
        order.mark_reservation_accepted().unwrap();
        order.mark_payment_accepted().unwrap();

        let result = order.mark_failed("too late");
        assert!(matches!(
            result,
            Err(OrderError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_cancellation_lifecycle() {
        let mut order = placed_order();
        order.mark_reservation_accepted().unwrap();
        order.mark_payment_accepted().unwrap();
        order.take_events();

        order.request_cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::CancelRequested);

        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.is_terminal());

        let types: Vec<_> = order
            .take_events()
            .iter()
            .map(OrderEvent::event_type)
            .collect::<Vec<_>>();
        assert_eq!(types, vec!["CancelRequested", "OrderCancelled"]);
    }

    #[test]
    fn test_cannot_cancel_unfulfilled_order() {
        let mut order = placed_order();
        assert!(matches!(
            order.request_cancel(),
            Err(OrderError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            order.cancel(),
            Err(OrderError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_events_drain_once() {
        let mut order = placed_order();
        assert_eq!(order.take_events().len(), 1);
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn test_serialization_skips_pending_events() {
        let order = placed_order();
        let json = serde_json::to_string(&order).unwrap();
        let mut back: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id(), order.id());
        assert_eq!(back.status(), order.status());
        assert_eq!(back.total_price(), order.total_price());
        assert!(back.take_events().is_empty());
    }
}
