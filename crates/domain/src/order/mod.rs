//! Order bounded context.

pub mod aggregate;
pub mod events;
pub mod postgres;
pub mod service;
pub mod state;
pub mod store;

pub use aggregate::{DeliveryInfo, Order, OrderItem};
pub use events::OrderEvent;
pub use postgres::PgOrderStore;
pub use service::OrderService;
pub use state::OrderStatus;
pub use store::{InMemoryOrderStore, OrderStore};
