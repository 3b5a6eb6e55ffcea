//! Domain layer: the Order aggregate and the Credit/Stock resource ledgers.
//!
//! Each bounded context owns its module: `order` holds the status machine
//! that the saga listener drives, `credit` and `stock` hold the ledgers the
//! participant managers mutate under row locks. Ledger changes emit events
//! consumed best-effort by the audit history stores.

pub mod credit;
pub mod error;
pub mod order;
pub mod stock;

pub use credit::{
    CreditChangeReason, CreditChanged, CreditHistoryRow, CreditHistoryStore, CreditRow,
    CreditService, CreditStore, InMemoryCreditHistoryStore, InMemoryCreditStore, UserCredit,
};
pub use error::{LedgerError, OrderError};
pub use order::{
    DeliveryInfo, InMemoryOrderStore, Order, OrderEvent, OrderItem, OrderService, OrderStatus,
    OrderStore,
};
pub use stock::{
    InMemoryStockHistoryStore, InMemoryStockStore, ProductStock, StockAdjustment,
    StockChangeReason, StockChanged, StockHistoryRow, StockHistoryStore, StockRow, StockService,
    StockStore,
};
