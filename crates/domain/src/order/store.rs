//! Order persistence contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Page, UserId};
use tokio::sync::RwLock;

use crate::error::OrderError;

use super::Order;

/// Persistence contract for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a newly placed order.
    async fn insert(&self, order: &Order) -> Result<(), OrderError>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderError>;

    /// Lists a user's orders, newest first.
    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError>;

    /// Writes the order back, checking the optimistic version.
    ///
    /// On success the stored and in-memory versions are bumped together; a
    /// version mismatch returns [`OrderError::Conflict`] and writes nothing.
    async fn update(&self, order: &mut Order) -> Result<(), OrderError>;
}

/// In-memory order store for tests and the default runtime.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    rows: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        let mut rows = self.rows.write().await;
        rows.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError> {
        let rows = self.rows.read().await;
        let mut orders: Vec<_> = rows
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn update(&self, order: &mut Order) -> Result<(), OrderError> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&order.id())
            .ok_or(OrderError::NotFound(order.id()))?;

        if stored.version() != order.version() {
            return Err(OrderError::Conflict(order.id()));
        }

        order.set_version(order.version() + 1);
        *stored = order.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    use crate::order::{DeliveryInfo, OrderItem};

    fn order(user: i64) -> Order {
        Order::place(
            UserId::new(user),
            vec![OrderItem::new(1, "Widget", 1, Money::from_cents(500))],
            DeliveryInfo::new("Jordan Doe", "1 Main St", "555-0100"),
            Money::from_cents(500),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = order(1);
        store.insert(&order).await.unwrap();

        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.id(), order.id());
        assert_eq!(loaded.total_price(), order.total_price());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryOrderStore::new();
        assert!(store.get(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryOrderStore::new();
        let mut order = order(1);
        store.insert(&order).await.unwrap();

        order.mark_reservation_accepted().unwrap();
        store.update(&mut order).await.unwrap();
        assert_eq!(order.version(), 1);

        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.status(), super::super::OrderStatus::PaymentPending);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemoryOrderStore::new();
        let mut order = order(1);
        store.insert(&order).await.unwrap();

        let mut stale = store.get(order.id()).await.unwrap().unwrap();

        order.mark_reservation_accepted().unwrap();
        store.update(&mut order).await.unwrap();

        stale.mark_failed("late").unwrap();
        let result = store.update(&mut stale).await;
        assert!(matches!(result, Err(OrderError::Conflict(_))));

        // The committed transition survives.
        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), super::super::OrderStatus::PaymentPending);
    }

    #[tokio::test]
    async fn list_by_user_pages_newest_first() {
        let store = InMemoryOrderStore::new();
        for _ in 0..3 {
            store.insert(&order(7)).await.unwrap();
        }
        store.insert(&order(8)).await.unwrap();

        let all = store
            .list_by_user(UserId::new(7), Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].created_at() >= all[1].created_at());

        let page = store
            .list_by_user(UserId::new(7), Page::new(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id(), all[1].id());
    }
}
