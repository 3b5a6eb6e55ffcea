//! Shared building blocks for the order saga system.
//!
//! Identifier newtypes, the integer-cents `Money` value object, pagination,
//! and the bounded exponential-backoff retry helper used to recover from
//! optimistic-lock conflicts.

pub mod ids;
pub mod money;
pub mod page;
pub mod retry;

pub use ids::{OrderId, ProductId, RecordId, SagaId, UserId};
pub use money::Money;
pub use page::Page;
pub use retry::{RetryPolicy, with_retry};
