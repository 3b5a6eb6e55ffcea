//! Command entry points for the order sagas.

use std::sync::Arc;

use common::{Money, OrderId, Page, SagaId, UserId};
use domain::{DeliveryInfo, Order, OrderError, OrderItem, OrderService, OrderStore};
use outbox::{OutboxRecord, OutboxStore, SagaKind};

use crate::error::SagaError;
use crate::payload::{PaymentPayload, StockReductionPayload};

/// Starts sagas and serves the order query surface.
///
/// Placement persists the order and its first outbox record in one unit of
/// work, so the intent to notify the inventory participant exists exactly
/// when the order does.
pub struct OrderSagaService<S: OrderStore> {
    orders: Arc<OrderService<S>>,
    payment_outbox: Arc<dyn OutboxStore>,
    stock_outbox: Arc<dyn OutboxStore>,
}

impl<S: OrderStore> OrderSagaService<S> {
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

    /// Validates and persists a new order and starts its fulfillment saga.
    #[tracing::instrument(skip(self, items, delivery), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        delivery: DeliveryInfo,
        declared_total: Money,
    ) -> Result<Order, SagaError> {
        let order = Order::place(user_id, items, delivery, declared_total)?;
        let order = self.orders.place(order).await?;

        let payload = StockReductionPayload::from_order(&order);
        self.stock_outbox
            .enqueue(OutboxRecord::new(
                SagaId::new(),
                order.id(),
                SagaKind::OrderFulfillment,
                payload.to_json()?,
            ))
            .await?;

        metrics::counter!("sagas_started_total").increment(1);
        tracing::info!(order_id = %order.id(), total = %order.total_price(), "order placed");
        Ok(order)
    }

    /// Requests cancellation of a fulfilled order and starts the
    /// cancellation saga: refund the payment, then restore the stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, SagaError> {
        let order = self.orders.get(order_id).await?;
        // Another user's order is reported as missing, not as forbidden.
        if order.user_id() != user_id {
            return Err(OrderError::NotFound(order_id).into());
        }

        let order = self.orders.apply(order_id, |o| o.request_cancel()).await?;

        let payload = PaymentPayload::new(order.user_id(), order.total_price());
        self.payment_outbox
            .enqueue(OutboxRecord::new(
                SagaId::new(),
                order_id,
                SagaKind::OrderCancellation,
                payload.to_json()?,
            ))
            .await?;

        metrics::counter!("sagas_started_total").increment(1);
        tracing::info!(order_id = %order_id, "cancellation requested");
        Ok(order)
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, SagaError> {
        Ok(self.orders.get(order_id).await?)
    }

    /// Lists a user's orders, newest first.
    pub async fn list_orders(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, SagaError> {
        Ok(self.orders.list_for_user(user_id, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{InMemoryOrderStore, OrderStatus};
    use outbox::InMemoryOutboxStore;

    struct Fixture {
        service: OrderSagaService<InMemoryOrderStore>,
        payment_outbox: Arc<InMemoryOutboxStore>,
        stock_outbox: Arc<InMemoryOutboxStore>,
    }

    fn fixture() -> Fixture {
        let orders = Arc::new(OrderService::new(InMemoryOrderStore::new()));
        let payment_outbox = Arc::new(InMemoryOutboxStore::new());
        let stock_outbox = Arc::new(InMemoryOutboxStore::new());
        let service = OrderSagaService::new(orders, payment_outbox.clone(), stock_outbox.clone());
        Fixture {
            service,
            payment_outbox,
            stock_outbox,
        }
    }

    fn items() -> Vec<OrderItem> {
        vec![OrderItem::new(1, "Widget", 2, Money::from_cents(1500))]
    }

    fn delivery() -> DeliveryInfo {
        DeliveryInfo::new("Jordan Doe", "1 Main St", "555-0100")
    }

    #[tokio::test]
    async fn place_order_writes_order_and_first_step() {
        let fixture = fixture();
        let order = fixture
            .service
            .place_order(UserId::new(1), items(), delivery(), Money::from_cents(3000))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::StockPending);

        // Exactly one unclaimed stock step, none for payment yet.
        assert_eq!(fixture.stock_outbox.len().await, 1);
        assert_eq!(fixture.payment_outbox.len().await, 0);

        let record = fixture
            .stock_outbox
            .claim_unprocessed(10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(record.order_id, order.id());
        assert_eq!(record.kind, SagaKind::OrderFulfillment);

        let payload = StockReductionPayload::from_json(&record.payload).unwrap();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn place_order_rejects_price_mismatch_without_side_effects() {
        let fixture = fixture();
        let result = fixture
            .service
            .place_order(UserId::new(1), items(), delivery(), Money::from_cents(100))
            .await;

        assert!(matches!(
            result,
            Err(SagaError::Order(OrderError::PriceMismatch { .. }))
        ));
        assert!(fixture.stock_outbox.is_empty().await);
    }

    #[tokio::test]
    async fn cancel_order_starts_refund_saga() {
        let fixture = fixture();
        let order = fixture
            .service
            .place_order(UserId::new(1), items(), delivery(), Money::from_cents(3000))
            .await
            .unwrap();

        // Drive the order to Fulfilled the way the listener would.
        fixture
            .service
            .orders
            .apply(order.id(), |o| o.mark_reservation_accepted())
            .await
            .unwrap();
        fixture
            .service
            .orders
            .apply(order.id(), |o| o.mark_payment_accepted())
            .await
            .unwrap();

        let cancelled = fixture
            .service
            .cancel_order(UserId::new(1), order.id())
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::CancelRequested);

        let record = fixture
            .payment_outbox
            .claim_unprocessed(10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(record.kind, SagaKind::OrderCancellation);
        let payload = PaymentPayload::from_json(&record.payload).unwrap();
        assert_eq!(payload.amount(), Money::from_cents(3000));
    }

    #[tokio::test]
    async fn cancel_requires_fulfilled_order() {
        let fixture = fixture();
        let order = fixture
            .service
            .place_order(UserId::new(1), items(), delivery(), Money::from_cents(3000))
            .await
            .unwrap();

        let result = fixture.service.cancel_order(UserId::new(1), order.id()).await;
        assert!(matches!(
            result,
            Err(SagaError::Order(OrderError::InvalidStateTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn cancel_hides_other_users_orders() {
        let fixture = fixture();
        let order = fixture
            .service
            .place_order(UserId::new(1), items(), delivery(), Money::from_cents(3000))
            .await
            .unwrap();

        let result = fixture.service.cancel_order(UserId::new(2), order.id()).await;
        assert!(matches!(
            result,
            Err(SagaError::Order(OrderError::NotFound(_)))
        ));
        assert!(fixture.payment_outbox.is_empty().await);
    }

    #[tokio::test]
    async fn list_orders_pages_per_user() {
        let fixture = fixture();
        for _ in 0..3 {
            fixture
                .service
                .place_order(UserId::new(7), items(), delivery(), Money::from_cents(3000))
                .await
                .unwrap();
        }

        let orders = fixture
            .service
            .list_orders(UserId::new(7), Page::default())
            .await
            .unwrap();
        assert_eq!(orders.len(), 3);

        let other = fixture
            .service
            .list_orders(UserId::new(8), Page::default())
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
