//! Credit bounded context: the user's spendable balance.

pub mod ledger;
pub mod postgres;
pub mod service;
pub mod store;

pub use ledger::{CreditChangeReason, CreditChanged, CreditRow, UserCredit};
pub use postgres::{PgCreditHistoryStore, PgCreditStore};
pub use service::CreditService;
pub use store::{
    CreditHistoryRow, CreditHistoryStore, CreditStore, InMemoryCreditHistoryStore,
    InMemoryCreditStore,
};
