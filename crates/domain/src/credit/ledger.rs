//! Credit ledger aggregate.

use chrono::{DateTime, Utc};
use common::{Money, UserId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Persistent fields of a credit account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRow {
    pub user_id: UserId,
    pub amount: Money,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl CreditRow {
    /// Creates a fresh account row.
    pub fn new(user_id: UserId, amount: Money) -> Self {
        Self {
            user_id,
            amount,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Why a balance changed; recorded on every change event and history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditChangeReason {
    OrderPayment,
    OrderRefund,
    TopUp,
    Adjustment,
}

impl CreditChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditChangeReason::OrderPayment => "OrderPayment",
            CreditChangeReason::OrderRefund => "OrderRefund",
            CreditChangeReason::TopUp => "TopUp",
            CreditChangeReason::Adjustment => "Adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OrderPayment" => Some(CreditChangeReason::OrderPayment),
            "OrderRefund" => Some(CreditChangeReason::OrderRefund),
            "TopUp" => Some(CreditChangeReason::TopUp),
            "Adjustment" => Some(CreditChangeReason::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for CreditChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emitted by every successful balance mutation.
///
/// Consumed best-effort by the history appender; a lost event never fails
/// the mutation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditChanged {
    pub user_id: UserId,
    pub previous: Money,
    pub delta: Money,
    pub current: Money,
    pub reason: CreditChangeReason,
    pub occurred_at: DateTime<Utc>,
}

/// Credit ledger aggregate: a row plus the change events of the current
/// mutation, drained on commit.
#[derive(Debug)]
pub struct UserCredit {
    row: CreditRow,
    events: Vec<CreditChanged>,
}

impl UserCredit {
    pub fn from_row(row: CreditRow) -> Self {
        Self {
            row,
            events: Vec::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.row.user_id
    }

    pub fn amount(&self) -> Money {
        self.row.amount
    }

    /// Removes `amount` from the balance.
    ///
    /// Fails without mutating when the amount is not positive or the balance
    /// would go negative.
    pub fn debit(&mut self, amount: Money, reason: CreditChangeReason) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if self.row.amount < amount {
            return Err(LedgerError::InsufficientBalance {
                user_id: self.row.user_id,
                available: self.row.amount,
                requested: amount,
            });
        }

        let previous = self.row.amount;
        self.row.amount -= amount;
        self.events.push(CreditChanged {
            user_id: self.row.user_id,
            previous,
            delta: Money::zero() - amount,
            current: self.row.amount,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Adds `amount` to the balance.
    pub fn credit(&mut self, amount: Money, reason: CreditChangeReason) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let previous = self.row.amount;
        self.row.amount += amount;
        self.events.push(CreditChanged {
            user_id: self.row.user_id,
            previous,
            delta: amount,
            current: self.row.amount,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Splits the aggregate into its row and the drained change events.
    pub fn into_parts(self) -> (CreditRow, Vec<CreditChanged>) {
        (self.row, self.events)
    }
}
