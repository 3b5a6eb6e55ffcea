//! Relay record types and their status machines.

use chrono::{DateTime, Utc};
use common::{OrderId, RecordId, SagaId};
use serde::{Deserialize, Serialize};

/// The kind of saga a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaKind {
    /// Forward flow: reserve stock, then take payment.
    OrderFulfillment,

    /// Reverse flow for a fulfilled order: refund payment, then restore stock.
    OrderCancellation,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::OrderFulfillment => "OrderFulfillment",
            SagaKind::OrderCancellation => "OrderCancellation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OrderFulfillment" => Some(SagaKind::OrderFulfillment),
            "OrderCancellation" => Some(SagaKind::OrderCancellation),
            _ => None,
        }
    }
}

impl std::fmt::Display for SagaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status of a relay record.
///
/// A record starts with no status ("unset"), is marked `Started` when the
/// poller claims it, and ends `Completed` or `Failed`. Terminal transitions
/// set `processed_at` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboxStatus {
    Started,
    Completed,
    Failed,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Completed | OutboxStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Started => "Started",
            OutboxStatus::Completed => "Completed",
            OutboxStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Started" => Some(OutboxStatus::Started),
            "Completed" => Some(OutboxStatus::Completed),
            "Failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow bookkeeping carried on the emitting side of a step.
///
/// Where [`OutboxStatus`] tracks delivery of a single record, `SagaStatus`
/// tracks where the step sits in the overall saga: the compensation sweep
/// selects completed steps flagged `Compensating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    Started,
    Processing,
    Succeeded,
    Compensating,
    Compensated,
    Failed,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "Started",
            SagaStatus::Processing => "Processing",
            SagaStatus::Succeeded => "Succeeded",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Started" => Some(SagaStatus::Started),
            "Processing" => Some(SagaStatus::Processing),
            "Succeeded" => Some(SagaStatus::Succeeded),
            "Compensating" => Some(SagaStatus::Compensating),
            "Compensated" => Some(SagaStatus::Compensated),
            "Failed" => Some(SagaStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The receiving participant's verdict on an inbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
            StepStatus::Compensating => "Compensating",
            StepStatus::Compensated => "Compensated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Completed" => Some(StepStatus::Completed),
            "Failed" => Some(StepStatus::Failed),
            "Compensating" => Some(StepStatus::Compensating),
            "Compensated" => Some(StepStatus::Compensated),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One saga step, owned by the participant that emitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: RecordId,
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub kind: SagaKind,

    /// Serialized step payload; the wire contract between participants.
    pub payload: String,

    pub saga_status: SagaStatus,
    pub outbox_status: Option<OutboxStatus>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Creates an unclaimed record for a new saga step.
    pub fn new(saga_id: SagaId, order_id: OrderId, kind: SagaKind, payload: String) -> Self {
        Self {
            id: RecordId::new(),
            saga_id,
            order_id,
            kind,
            payload,
            saga_status: SagaStatus::Started,
            outbox_status: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outbox_status.is_some_and(|s| s.is_terminal())
    }
}

/// The receiving participant's copy of a relayed step.
///
/// Shares the emitting record's id, which is the idempotency key: inserting
/// the same id twice is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxRecord {
    pub id: RecordId,
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub kind: SagaKind,
    pub payload: String,
    pub step_status: Option<StepStatus>,
    pub outbox_status: Option<OutboxStatus>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl InboxRecord {
    /// Mirrors an outbox record into the receiving participant's inbox.
    pub fn mirror_of(record: &OutboxRecord) -> Self {
        Self {
            id: record.id,
            saga_id: record.saga_id,
            order_id: record.order_id,
            kind: record.kind,
            payload: record.payload.clone(),
            step_status: None,
            outbox_status: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outbox_status.is_some_and(|s| s.is_terminal())
    }
}
