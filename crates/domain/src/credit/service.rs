//! Credit service: locked balance mutations with bounded retry and
//! best-effort history.

use common::{Money, RetryPolicy, UserId, with_retry};

use crate::error::LedgerError;

use super::ledger::{CreditChangeReason, CreditChanged};
use super::store::{CreditHistoryRow, CreditHistoryStore, CreditStore};

pub struct CreditService<S, H>
where
    S: CreditStore,
    H: CreditHistoryStore,
{
    store: S,
    history: H,
    retry: RetryPolicy,
}

impl<S, H> CreditService<S, H>
where
    S: CreditStore,
    H: CreditHistoryStore,
{
    pub fn new(store: S, history: H) -> Self {
        Self {
            store,
            history,
            retry: RetryPolicy::default(),
        }
    }

    /// Opens an account with an initial balance.
    #[tracing::instrument(skip(self))]
    pub async fn open_account(&self, user_id: UserId, initial: Money) -> Result<(), LedgerError> {
        self.store.create(user_id, initial).await
    }

    /// Returns the current balance.
    pub async fn balance(&self, user_id: UserId) -> Result<Money, LedgerError> {
        let row = self
            .store
            .get(user_id)
            .await?
            .ok_or(LedgerError::CreditNotFound(user_id))?;
        Ok(row.amount)
    }

    /// Removes `amount` from the balance under the row lock.
    #[tracing::instrument(skip(self))]
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Money,
        reason: CreditChangeReason,
    ) -> Result<(), LedgerError> {
        let events = with_retry(
            self.retry,
            "credit debit",
            LedgerError::is_retryable,
            || async {
                self.store
                    .mutate(user_id, move |c| c.debit(amount, reason))
                    .await
            },
        )
        .await?;
        self.record_history(events).await;
        Ok(())
    }

    /// Adds `amount` to the balance under the row lock.
    #[tracing::instrument(skip(self))]
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        reason: CreditChangeReason,
    ) -> Result<(), LedgerError> {
        let events = with_retry(
            self.retry,
            "credit refund",
            LedgerError::is_retryable,
            || async {
                self.store
                    .mutate(user_id, move |c| c.credit(amount, reason))
                    .await
            },
        )
        .await?;
        self.record_history(events).await;
        Ok(())
    }

    /// Tops up a balance, opening the account on first use.
    #[tracing::instrument(skip(self))]
    pub async fn top_up(&self, user_id: UserId, amount: Money) -> Result<(), LedgerError> {
        if self.store.get(user_id).await?.is_none() {
            self.store.create(user_id, Money::zero()).await?;
        }
        self.credit(user_id, amount, CreditChangeReason::TopUp).await
    }

    /// Returns the account's audit history.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<CreditHistoryRow>, LedgerError> {
        self.history.list_by_user(user_id).await
    }

    /// Appends change events to the audit history.
    ///
    /// Best-effort: the balance mutation already committed, so append
    /// failures are logged and swallowed.
    async fn record_history(&self, events: Vec<CreditChanged>) {
        for event in events {
            if let Err(err) = self.history.append(event.into()).await {
                tracing::warn!(%err, "failed to append credit history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::store::{InMemoryCreditHistoryStore, InMemoryCreditStore};

    fn service() -> CreditService<InMemoryCreditStore, InMemoryCreditHistoryStore> {
        CreditService::new(InMemoryCreditStore::new(), InMemoryCreditHistoryStore::new())
    }

    #[tokio::test]
    async fn debit_and_refund_roundtrip() {
        let service = service();
        let user = UserId::new(1);
        service
            .open_account(user, Money::from_cents(10_000))
            .await
            .unwrap();

        service
            .debit(user, Money::from_cents(3000), CreditChangeReason::OrderPayment)
            .await
            .unwrap();
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(7000));

        service
            .credit(user, Money::from_cents(3000), CreditChangeReason::OrderRefund)
            .await
            .unwrap();
        assert_eq!(
            service.balance(user).await.unwrap(),
            Money::from_cents(10_000)
        );

        let history = service.history(user).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, CreditChangeReason::OrderPayment);
        assert_eq!(history[1].reason, CreditChangeReason::OrderRefund);
    }

    #[tokio::test]
    async fn insufficient_balance_surfaces() {
        let service = service();
        let user = UserId::new(1);
        service
            .open_account(user, Money::from_cents(500))
            .await
            .unwrap();

        let result = service
            .debit(user, Money::from_cents(3000), CreditChangeReason::OrderPayment)
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(500));
        assert!(service.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_up_opens_account_on_first_use() {
        let service = service();
        let user = UserId::new(5);

        service.top_up(user, Money::from_cents(2000)).await.unwrap();
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(2000));

        service.top_up(user, Money::from_cents(500)).await.unwrap();
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(2500));
    }

    #[tokio::test]
    async fn balance_of_missing_account_fails() {
        let service = service();
        let result = service.balance(UserId::new(404)).await;
        assert!(matches!(result, Err(LedgerError::CreditNotFound(_))));
    }
}
