//! Engine wiring: relay, participants, and listener over one store set.
//!
//! Production runs the sweeps as periodic tasks ([`SagaEngine::spawn`]);
//! tests drive the same components deterministically with
//! [`SagaEngine::settle`], which loops until no component makes progress.

use std::sync::Arc;
use std::time::Duration;

use domain::{
    CreditHistoryStore, CreditService, CreditStore, InMemoryCreditHistoryStore,
    InMemoryCreditStore, InMemoryOrderStore, InMemoryStockHistoryStore, InMemoryStockStore,
    OrderService, OrderStore, StockHistoryStore, StockService, StockStore,
};
use outbox::{InMemoryInboxStore, InMemoryOutboxStore, InboxStore, OutboxStore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::SagaError;
use crate::listener::SagaResponseListener;
use crate::participant::{CreditOutboxManager, StockOutboxManager};
use crate::relay::OutboxRelay;
use crate::response::{ResponseReceiver, response_channel};
use crate::service::OrderSagaService;

/// Default sweep interval for the periodic tasks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A fully wired saga engine over one set of stores.
pub struct SagaEngine<OS, CS, CH, SS, SH>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    credits: Arc<CreditService<CS, CH>>,
    stocks: Arc<StockService<SS, SH>>,
    service: Arc<OrderSagaService<OS>>,
    relay: Arc<OutboxRelay>,
    credit_manager: Arc<CreditOutboxManager<CS, CH>>,
    stock_manager: Arc<StockOutboxManager<SS, SH>>,
    listener: Arc<SagaResponseListener<OS>>,
    responses: Mutex<ResponseReceiver>,
    poll_interval: Duration,
}

impl<OS, CS, CH, SS, SH> SagaEngine<OS, CS, CH, SS, SH>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    pub fn new(
        orders: OrderService<OS>,
        credits: CreditService<CS, CH>,
        stocks: StockService<SS, SH>,
        payment_outbox: Arc<dyn OutboxStore>,
        stock_outbox: Arc<dyn OutboxStore>,
        credit_inbox: Arc<dyn InboxStore>,
        stock_inbox: Arc<dyn InboxStore>,
    ) -> Self {
        let orders = Arc::new(orders);
        let credits = Arc::new(credits);
        let stocks = Arc::new(stocks);
        let (tx, rx) = response_channel();

        let relay = Arc::new(OutboxRelay::new(
            payment_outbox.clone(),
            stock_outbox.clone(),
            credit_inbox.clone(),
            stock_inbox.clone(),
        ));
        let credit_manager = Arc::new(CreditOutboxManager::new(
            credit_inbox,
            credits.clone(),
            tx.clone(),
        ));
        let stock_manager = Arc::new(StockOutboxManager::new(stock_inbox, stocks.clone(), tx));
        let listener = Arc::new(SagaResponseListener::new(
            orders.clone(),
            payment_outbox.clone(),
            stock_outbox.clone(),
        ));
        let service = Arc::new(OrderSagaService::new(orders, payment_outbox, stock_outbox));

        Self {
            credits,
            stocks,
            service,
            relay,
            credit_manager,
            stock_manager,
            listener,
            responses: Mutex::new(rx),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the sweep interval of the periodic tasks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The saga command entry and order query surface.
    pub fn service(&self) -> &OrderSagaService<OS> {
        &self.service
    }

    /// The credit ledger service (admin surface).
    pub fn credits(&self) -> &CreditService<CS, CH> {
        &self.credits
    }

    /// The stock ledger service (admin surface).
    pub fn stocks(&self) -> &StockService<SS, SH> {
        &self.stocks
    }

    /// Drives relay, participants, and listener until nothing makes
    /// progress.
    ///
    /// Every in-flight saga that can reach a terminal state without outside
    /// input does so before this returns. Deterministic replacement for the
    /// periodic tasks in tests and single-shot tools.
    pub async fn settle(&self) -> Result<(), SagaError> {
        loop {
            let mut progressed = 0;
            progressed += self.relay.run_once().await?;
            progressed += self.stock_manager.run_once().await?;
            progressed += self.credit_manager.run_once().await?;

            let mut responses = self.responses.lock().await;
            while let Some(response) = responses.try_recv() {
                self.listener.handle(response).await?;
                progressed += 1;
            }
            drop(responses);

            if progressed == 0 {
                return Ok(());
            }
        }
    }

    /// Spawns the periodic sweeps and the listener loop.
    ///
    /// The returned handles never resolve on their own; abort them on
    /// shutdown.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(4);

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(err) = engine.relay.run_once().await {
                    tracing::error!(%err, "relay sweep failed");
                }
            }
        }));

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(err) = engine.stock_manager.run_once().await {
                    tracing::error!(%err, "stock sweep failed");
                }
            }
        }));

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(err) = engine.credit_manager.run_once().await {
                    tracing::error!(%err, "credit sweep failed");
                }
            }
        }));

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            // The receiver stays locked for the lifetime of the task; the
            // spawned engine and `settle` are alternative drivers, not
            // concurrent ones.
            let mut responses = engine.responses.lock().await;
            while let Some(response) = responses.recv().await {
                if let Err(err) = engine.listener.handle(response).await {
                    tracing::error!(%err, "response handling failed");
                }
            }
        }));

        handles
    }
}

/// Engine over the in-memory stores, backing the tests and the default
/// binary.
pub type InMemorySagaEngine = SagaEngine<
    InMemoryOrderStore,
    InMemoryCreditStore,
    InMemoryCreditHistoryStore,
    InMemoryStockStore,
    InMemoryStockHistoryStore,
>;

impl InMemorySagaEngine {
    /// Builds a fully wired engine over fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            OrderService::new(InMemoryOrderStore::new()),
            CreditService::new(InMemoryCreditStore::new(), InMemoryCreditHistoryStore::new()),
            StockService::new(InMemoryStockStore::new(), InMemoryStockHistoryStore::new()),
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(InMemoryInboxStore::new()),
            Arc::new(InMemoryInboxStore::new()),
        )
    }
}
