//! Order placement, cancellation, and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, UserId};
use domain::{
    CreditHistoryStore, CreditStore, DeliveryInfo, Order, OrderItem, OrderStore,
    StockHistoryStore, StockStore,
};
use saga::SagaEngine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: i64,
    pub items: Vec<OrderItemRequest>,
    pub delivery: DeliveryRequest,
    pub total_cents: i64,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct DeliveryRequest {
    pub receiver_name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: i64,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CancelQuery {
    pub user_id: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: i64,
    pub status: String,
    pub total_cents: i64,
    pub items: Vec<OrderItemResponse>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderResponse {
    fn from_order(order: &Order) -> Self {
        Self {
            id: order.id().as_uuid(),
            user_id: order.user_id().as_i64(),
            status: order.status().to_string(),
            total_cents: order.total_price().cents(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.as_i64(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            failure_reason: order.failure_reason().map(String::from),
            created_at: order.created_at(),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order and start its fulfillment saga.
#[tracing::instrument(skip(engine, req))]
pub async fn place<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let items: Vec<OrderItem> = req
        .items
        .iter()
        .map(|item| {
            OrderItem::new(
                item.product_id,
                item.product_name.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
        .collect();
    let delivery = DeliveryInfo::new(
        req.delivery.receiver_name.as_str(),
        req.delivery.address.as_str(),
        req.delivery.phone.as_str(),
    );

    let order = engine
        .service()
        .place_order(
            UserId::new(req.user_id),
            items,
            delivery,
            Money::from_cents(req.total_cents),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from_order(&order))))
}

/// GET /orders/{id} — load an order.
#[tracing::instrument(skip(engine))]
pub async fn get<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let order = engine.service().get_order(OrderId::from_uuid(id)).await?;
    Ok(Json(OrderResponse::from_order(&order)))
}

/// GET /orders?user_id= — list a user's orders, newest first.
#[tracing::instrument(skip(engine, query))]
pub async fn list<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let page = match query.limit {
        Some(limit) => Page::new(query.offset, limit),
        None => Page {
            offset: query.offset,
            ..Page::default()
        },
    };
    let orders = engine
        .service()
        .list_orders(UserId::new(query.user_id), page)
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from_order).collect()))
}

/// DELETE /orders/{id}?user_id= — request cancellation of a fulfilled order.
#[tracing::instrument(skip(engine, query))]
pub async fn cancel<OS, CS, CH, SS, SH>(
    State(engine): State<Arc<SagaEngine<OS, CS, CH, SS, SH>>>,
    Path(id): Path<Uuid>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<OrderResponse>, ApiError>
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let order = engine
        .service()
        .cancel_order(UserId::new(query.user_id), OrderId::from_uuid(id))
        .await?;
    Ok(Json(OrderResponse::from_order(&order)))
}
