//! Stock service: locked level mutations with bounded retry and
//! best-effort history.

use common::{ProductId, RetryPolicy, with_retry};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

use super::ledger::{StockChangeReason, StockChanged};
use super::store::{StockHistoryRow, StockHistoryStore, StockStore};

/// One product/quantity pair of a multi-item mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockAdjustment {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

pub struct StockService<S, H>
where
    S: StockStore,
    H: StockHistoryStore,
{
    store: S,
    history: H,
    retry: RetryPolicy,
}

impl<S, H> StockService<S, H>
where
    S: StockStore,
    H: StockHistoryStore,
{
    pub fn new(store: S, history: H) -> Self {
        Self {
            store,
            history,
            retry: RetryPolicy::default(),
        }
    }

    /// Registers a product's stock row.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, product_id: ProductId, quantity: u32) -> Result<(), LedgerError> {
        self.store.create(product_id, quantity).await
    }

    /// Returns the current level.
    pub async fn level(&self, product_id: ProductId) -> Result<u32, LedgerError> {
        let row = self
            .store
            .get(product_id)
            .await?
            .ok_or(LedgerError::StockNotFound(product_id))?;
        Ok(row.quantity)
    }

    /// Decrements every item's level under the row locks; all or nothing.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn sell(&self, items: Vec<StockAdjustment>) -> Result<(), LedgerError> {
        self.apply_all(items, StockChangeReason::Sale).await
    }

    /// Restores every item's level; the reverse of [`StockService::sell`].
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn restock(&self, items: Vec<StockAdjustment>) -> Result<(), LedgerError> {
        self.apply_all(items, StockChangeReason::Return).await
    }

    /// Sets a product's level to an absolute quantity.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(&self, product_id: ProductId, quantity: u32) -> Result<(), LedgerError> {
        let events = with_retry(
            self.retry,
            "stock adjust",
            LedgerError::is_retryable,
            || async {
                self.store
                    .mutate(product_id, move |s| s.adjust(quantity))
                    .await
            },
        )
        .await?;
        self.record_history(events).await;
        Ok(())
    }

    /// Returns a product's audit history.
    pub async fn history(&self, product_id: ProductId) -> Result<Vec<StockHistoryRow>, LedgerError> {
        self.history.list_by_product(product_id).await
    }

    async fn apply_all(
        &self,
        items: Vec<StockAdjustment>,
        reason: StockChangeReason,
    ) -> Result<(), LedgerError> {
        let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let events = with_retry(
            self.retry,
            "stock mutation",
            LedgerError::is_retryable,
            || {
                let ids = ids.clone();
                let items = items.clone();
                async move {
                    self.store
                        .mutate_many(ids, move |stocks| {
                            for item in &items {
                                let stock = stocks
                                    .iter_mut()
                                    .find(|s| s.product_id() == item.product_id)
                                    .ok_or(LedgerError::StockNotFound(item.product_id))?;
                                match reason {
                                    StockChangeReason::Return => {
                                        stock.increase(item.quantity, reason)?
                                    }
                                    _ => stock.decrease(item.quantity, reason)?,
                                }
                            }
                            Ok(())
                        })
                        .await
                }
            },
        )
        .await?;
        self.record_history(events).await;
        Ok(())
    }

    /// Appends change events to the audit history.
    ///
    /// Best-effort: the level mutation already committed, so append failures
    /// are logged and swallowed.
    async fn record_history(&self, events: Vec<StockChanged>) {
        for event in events {
            if let Err(err) = self.history.append(event.into()).await {
                tracing::warn!(%err, "failed to append stock history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::store::{InMemoryStockHistoryStore, InMemoryStockStore};

    fn service() -> StockService<InMemoryStockStore, InMemoryStockHistoryStore> {
        StockService::new(InMemoryStockStore::new(), InMemoryStockHistoryStore::new())
    }

    #[tokio::test]
    async fn sell_and_restock_roundtrip() {
        let service = service();
        let product = ProductId::new(1);
        service.register(product, 10).await.unwrap();

        service
            .sell(vec![StockAdjustment::new(product, 2)])
            .await
            .unwrap();
        assert_eq!(service.level(product).await.unwrap(), 8);

        service
            .restock(vec![StockAdjustment::new(product, 2)])
            .await
            .unwrap();
        assert_eq!(service.level(product).await.unwrap(), 10);

        let history = service.history(product).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, StockChangeReason::Sale);
        assert_eq!(history[1].reason, StockChangeReason::Return);
    }

    #[tokio::test]
    async fn multi_item_sale_is_all_or_nothing() {
        let service = service();
        service.register(ProductId::new(1), 10).await.unwrap();
        service.register(ProductId::new(2), 1).await.unwrap();

        let result = service
            .sell(vec![
                StockAdjustment::new(ProductId::new(1), 5),
                StockAdjustment::new(ProductId::new(2), 5),
            ])
            .await;

        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
        assert_eq!(service.level(ProductId::new(1)).await.unwrap(), 10);
        assert_eq!(service.level(ProductId::new(2)).await.unwrap(), 1);
        assert!(service.history(ProductId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adjust_sets_absolute_level() {
        let service = service();
        let product = ProductId::new(1);
        service.register(product, 10).await.unwrap();

        service.adjust(product, 3).await.unwrap();
        assert_eq!(service.level(product).await.unwrap(), 3);

        let history = service.history(product).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, -7);
    }

    #[tokio::test]
    async fn level_of_missing_product_fails() {
        let service = service();
        let result = service.level(ProductId::new(404)).await;
        assert!(matches!(result, Err(LedgerError::StockNotFound(_))));
    }
}
