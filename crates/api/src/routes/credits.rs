//! Credit ledger admin endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{Money, UserId};
use domain::{
    CreditHistoryStore, CreditStore, OrderStore, StockHistoryStore, StockStore,
};
use saga::SagaEngine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Deserialize)]
pub struct TopUpRequest {
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct CreditResponse {
    pub user_id: i64,
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct CreditHistoryResponse {
    pub previous_cents: i64,
    pub delta_cents: i64,
    pub current_cents: i64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// GET /credits/{user_id} — current balance.
#[tracing::instrument(skip(engine))]
pub async fn get<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(user_id): Path<i64>,
) -> Result<Json<CreditResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let balance = engine.credits().balance(UserId::new(user_id)).await?;
    Ok(Json(CreditResponse {
        user_id,
        amount_cents: balance.cents(),
    }))
}

/// POST /credits/{user_id}/top-up — add funds, opening the account on first
/// use.
#[tracing::instrument(skip(engine, req))]
pub async fn top_up<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(user_id): Path<i64>,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<CreditResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let user = UserId::new(user_id);
    engine
        .credits()
        .top_up(user, Money::from_cents(req.amount_cents))
        .await?;
    let balance = engine.credits().balance(user).await?;
    Ok(Json(CreditResponse {
        user_id,
        amount_cents: balance.cents(),
    }))
}

/// GET /credits/{user_id}/history — the account's audit trail.
#[tracing::instrument(skip(engine))]
pub async fn history<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<CreditHistoryResponse>>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let rows = engine.credits().history(UserId::new(user_id)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| CreditHistoryResponse {
                previous_cents: row.previous.cents(),
                delta_cents: row.delta.cents(),
                current_cents: row.current.cents(),
                reason: row.reason.to_string(),
                recorded_at: row.recorded_at,
            })
            .collect(),
    ))
}
