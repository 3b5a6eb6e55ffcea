//! Stock ledger admin endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{
    CreditHistoryStore, CreditStore, LedgerError, OrderStore, StockHistoryStore, StockStore,
};
use saga::SagaEngine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct StockHistoryResponse {
    pub previous_quantity: u32,
    pub delta: i64,
    pub current_quantity: u32,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// GET /stocks/{product_id} — current stock level.
#[tracing::instrument(skip(engine))]
pub async fn get<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<StockResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let quantity = engine.stocks().level(ProductId::new(product_id)).await?;
    Ok(Json(StockResponse {
        product_id,
        quantity,
    }))
}

/// POST /stocks/{product_id}/adjust — set the stock level, registering the
/// product on first use.
#[tracing::instrument(skip(engine, req))]
pub async fn adjust<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(product_id): Path<i64>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<StockResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let product = ProductId::new(product_id);
    match engine.stocks().adjust(product, req.quantity).await {
        Ok(()) => {}
        Err(LedgerError::StockNotFound(_)) => {
            engine.stocks().register(product, req.quantity).await?;
        }
        Err(err) => return Err(err.into()),
    }
    let quantity = engine.stocks().level(product).await?;
    Ok(Json(StockResponse {
        product_id,
        quantity,
    }))
}

/// GET /stocks/{product_id}/history — the product's audit trail.
#[tracing::instrument(skip(engine))]
pub async fn history<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<Vec<StockHistoryResponse>>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let rows = engine.stocks().history(ProductId::new(product_id)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| StockHistoryResponse {
                previous_quantity: row.previous,
                delta: row.delta,
                current_quantity: row.current,
                reason: row.reason.to_string(),
                recorded_at: row.recorded_at,
            })
            .collect(),
    ))
}
