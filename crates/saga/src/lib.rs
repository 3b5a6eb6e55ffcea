//! Order fulfillment saga over a transactional outbox/inbox relay.
//!
//! Three co-located bounded contexts — Order, Credit, Inventory — stay
//! consistent without a distributed transaction. The order context writes an
//! outbox record in the same unit of work as the order itself; a relay
//! poller mirrors the record into the receiving participant's inbox; the
//! participant mutates its ledger under a row lock and emits a response
//! event; the response listener advances the order status machine and either
//! enqueues the next step or flags completed steps for compensation.
//!
//! Delivery is at-least-once end to end. Every handler keys on the record id
//! and its expected current status, so re-delivery of an already-terminal
//! record is a no-op.

pub mod engine;
pub mod error;
pub mod listener;
pub mod participant;
pub mod payload;
pub mod relay;
pub mod response;
pub mod service;

pub use engine::{InMemorySagaEngine, SagaEngine};
pub use error::SagaError;
pub use listener::SagaResponseListener;
pub use participant::{CreditOutboxManager, StockOutboxManager};
pub use payload::{PaymentPayload, StockReductionItem, StockReductionPayload};
pub use relay::OutboxRelay;
pub use response::{ResponseReceiver, ResponseSender, SagaResponse, response_channel};
pub use service::OrderSagaService;
