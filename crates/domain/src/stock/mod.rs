//! Inventory bounded context: per-product stock levels.

pub mod ledger;
pub mod postgres;
pub mod service;
pub mod store;

pub use ledger::{ProductStock, StockChangeReason, StockChanged, StockRow};
pub use postgres::{PgStockHistoryStore, PgStockStore};
pub use service::{StockAdjustment, StockService};
pub use store::{
    InMemoryStockHistoryStore, InMemoryStockStore, StockHistoryRow, StockHistoryStore, StockStore,
};
