//! Serialized step payloads: the wire contract between participants.

use common::{Money, ProductId, UserId};
use domain::{Order, StockAdjustment};
use serde::{Deserialize, Serialize};

/// Payload of the credit/payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub user_id: UserId,
    pub amount_cents: i64,
}

impl PaymentPayload {
    pub fn new(user_id: UserId, amount: Money) -> Self {
        Self {
            user_id,
            amount_cents: amount.cents(),
        }
    }

    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// One line of the inventory step payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReductionItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Payload of the inventory step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReductionPayload {
    pub items: Vec<StockReductionItem>,
}

impl StockReductionPayload {
    /// Builds the payload from the order's items.
    pub fn from_order(order: &Order) -> Self {
        Self {
            items: order
                .items()
                .iter()
                .map(|item| StockReductionItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }

    /// Converts the payload into ledger adjustments.
    pub fn to_adjustments(&self) -> Vec<StockAdjustment> {
        self.items
            .iter()
            .map(|item| StockAdjustment::new(item.product_id, item.quantity))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
