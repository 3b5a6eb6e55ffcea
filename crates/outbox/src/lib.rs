//! Transactional outbox/inbox relay tables.
//!
//! Each saga participant owns a pair of tables: an outbox holding the steps
//! it emits and an inbox holding the mirrored steps it consumes. A record is
//! written in the same unit of work as the business change that caused it
//! (the transactional outbox pattern), relayed by a poller, and never
//! deleted — terminal records form the audit trail of every saga.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryInboxStore, InMemoryOutboxStore};
pub use postgres::{PgInboxStore, PgOutboxStore, run_migrations};
pub use record::{InboxRecord, OutboxRecord, OutboxStatus, SagaKind, SagaStatus, StepStatus};
pub use store::{InboxStore, OutboxStore};
