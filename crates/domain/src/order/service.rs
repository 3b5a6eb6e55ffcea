//! Order service: load-mutate-commit with optimistic retry.

use common::{OrderId, Page, RetryPolicy, UserId, with_retry};

use crate::error::OrderError;

use super::{Order, OrderEvent, OrderStore};

/// Service for persisting orders and applying status transitions.
///
/// `apply` reloads the aggregate on every attempt, so events registered by a
/// conflicted attempt are discarded with the stale instance and each
/// committed transition publishes its events exactly once.
pub struct OrderService<S: OrderStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists a newly placed order and publishes its events.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn place(&self, mut order: Order) -> Result<Order, OrderError> {
        self.store.insert(&order).await?;
        self.publish(order.take_events());
        Ok(order)
    }

    /// Loads an order, failing if it does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.store.get(id).await?.ok_or(OrderError::NotFound(id))
    }

    /// Loads an order, returning `None` if it does not exist.
    pub async fn find(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
        self.store.get(id).await
    }

    /// Lists a user's orders, newest first.
    pub async fn list_for_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError> {
        self.store.list_by_user(user_id, page).await
    }

    /// Applies a transition to a stored order, retrying on version conflicts.
    #[tracing::instrument(skip(self, transition))]
    pub async fn apply<F>(&self, id: OrderId, transition: F) -> Result<Order, OrderError>
    where
        F: Fn(&mut Order) -> Result<(), OrderError>,
    {
        let mut order = with_retry(
            self.retry,
            "order transition",
            |e: &OrderError| matches!(e, OrderError::Conflict(_)),
            || async {
                let mut order = self.get(id).await?;
                transition(&mut order)?;
                self.store.update(&mut order).await?;
                Ok(order)
            },
        )
        .await?;

        self.publish(order.take_events());
        Ok(order)
    }

    fn publish(&self, events: Vec<OrderEvent>) {
        for event in events {
            metrics::counter!("order_events_total").increment(1);
            tracing::info!(
                event = event.event_type(),
                order_id = %event.order_id(),
                "order event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, UserId};

    use crate::order::{DeliveryInfo, InMemoryOrderStore, OrderItem, OrderStatus};

    fn service() -> OrderService<InMemoryOrderStore> {
        OrderService::new(InMemoryOrderStore::new())
    }

    fn order() -> Order {
        Order::place(
            UserId::new(1),
            vec![OrderItem::new(1, "Widget", 2, Money::from_cents(1500))],
            DeliveryInfo::new("Jordan Doe", "1 Main St", "555-0100"),
            Money::from_cents(3000),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn place_and_get() {
        let service = service();
        let placed = service.place(order()).await.unwrap();

        let loaded = service.get(placed.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::StockPending);
    }

    #[tokio::test]
    async fn get_missing_fails() {
        let service = service();
        let result = service.get(OrderId::new()).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn apply_advances_and_persists() {
        let service = service();
        let placed = service.place(order()).await.unwrap();

        let updated = service
            .apply(placed.id(), |o| o.mark_reservation_accepted())
            .await
            .unwrap();
        assert_eq!(updated.status(), OrderStatus::PaymentPending);

        let loaded = service.get(placed.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::PaymentPending);
        assert_eq!(loaded.version(), 1);
    }

    #[tokio::test]
    async fn apply_surfaces_guard_failures() {
        let service = service();
        let placed = service.place(order()).await.unwrap();

        let result = service
            .apply(placed.id(), |o| o.mark_payment_accepted())
            .await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidStateTransition { .. })
        ));

        // Nothing was committed.
        let loaded = service.get(placed.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::StockPending);
        assert_eq!(loaded.version(), 0);
    }

    #[tokio::test]
    async fn list_for_user() {
        let service = service();
        service.place(order()).await.unwrap();
        service.place(order()).await.unwrap();

        let orders = service
            .list_for_user(UserId::new(1), Page::default())
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);

        let none = service
            .list_for_user(UserId::new(99), Page::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
