//! Stock ledger aggregate.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Persistent fields of a stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    pub product_id: ProductId,
    pub quantity: u32,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRow {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockChangeReason {
    Sale,
    Return,
    Adjustment,
}

impl StockChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockChangeReason::Sale => "Sale",
            StockChangeReason::Return => "Return",
            StockChangeReason::Adjustment => "Adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Sale" => Some(StockChangeReason::Sale),
            "Return" => Some(StockChangeReason::Return),
            "Adjustment" => Some(StockChangeReason::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for StockChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emitted by every successful stock mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockChanged {
    pub product_id: ProductId,
    pub previous: u32,
    pub delta: i64,
    pub current: u32,
    pub reason: StockChangeReason,
    pub occurred_at: DateTime<Utc>,
}

/// Stock ledger aggregate: a row plus the change events of the current
/// mutation, drained on commit.
#[derive(Debug)]
pub struct ProductStock {
    row: StockRow,
    events: Vec<StockChanged>,
}

impl ProductStock {
    pub fn from_row(row: StockRow) -> Self {
        Self {
            row,
            events: Vec::new(),
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.row.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.row.quantity
    }

    pub fn is_available(&self) -> bool {
        self.row.quantity > 0
    }

    /// Removes `amount` units.
    ///
    /// Fails without mutating when `amount` is zero or exceeds the level.
    pub fn decrease(&mut self, amount: u32, reason: StockChangeReason) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::NonPositiveQuantity);
        }
        if self.row.quantity < amount {
            return Err(LedgerError::InsufficientStock {
                product_id: self.row.product_id,
                available: self.row.quantity,
                requested: amount,
            });
        }

        let previous = self.row.quantity;
        self.row.quantity -= amount;
        self.events.push(StockChanged {
            product_id: self.row.product_id,
            previous,
            delta: -(amount as i64),
            current: self.row.quantity,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Adds `amount` units.
    pub fn increase(&mut self, amount: u32, reason: StockChangeReason) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::NonPositiveQuantity);
        }

        let previous = self.row.quantity;
        self.row.quantity += amount;
        self.events.push(StockChanged {
            product_id: self.row.product_id,
            previous,
            delta: amount as i64,
            current: self.row.quantity,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Sets the level to `quantity`, recording the signed delta.
    pub fn adjust(&mut self, quantity: u32) -> Result<(), LedgerError> {
        let previous = self.row.quantity;
        if previous == quantity {
            return Ok(());
        }

        self.row.quantity = quantity;
        self.events.push(StockChanged {
            product_id: self.row.product_id,
            previous,
            delta: quantity as i64 - previous as i64,
            current: quantity,
            reason: StockChangeReason::Adjustment,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Splits the aggregate into its row and the drained change events.
    pub fn into_parts(self) -> (StockRow, Vec<StockChanged>) {
        (self.row, self.events)
    }
}
