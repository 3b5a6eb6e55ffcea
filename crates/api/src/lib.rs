//! HTTP adapter for the order saga engine.
//!
//! Exposes the command entry (order placement and cancellation), the order
//! query surface, and the credit/stock admin endpoints, with structured
//! logging (tracing) and Prometheus metrics. Only the order's status and
//! failure reason are exposed upward; the relay plumbing stays internal.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use domain::{CreditHistoryStore, CreditStore, OrderStore, StockHistoryStore, StockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Creates the application router over a wired saga engine.
pub fn create_app<OS, CS, CH, SS, SH>(
    engine: Arc<SagaEngine<OS, CS, CH, SS, SH>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<OS, CS, CH, SS, SH>))
        .route("/orders", get(routes::orders::list::<OS, CS, CH, SS, SH>))
        .route("/orders/{id}", get(routes::orders::get::<OS, CS, CH, SS, SH>))
        .route(
            "/orders/{id}",
            delete(routes::orders::cancel::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/credits/{user_id}",
            get(routes::credits::get::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/credits/{user_id}/top-up",
            post(routes::credits::top_up::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/credits/{user_id}/history",
            get(routes::credits::history::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/stocks/{product_id}",
            get(routes::stocks::get::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/stocks/{product_id}/adjust",
            post(routes::stocks::adjust::<OS, CS, CH, SS, SH>),
        )
        .route(
            "/stocks/{product_id}/history",
            get(routes::stocks::history::<OS, CS, CH, SS, SH>),
        )
        .with_state(engine)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
