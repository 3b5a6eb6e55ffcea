//! API server entry point.
//!
//! Runs against PostgreSQL when `DATABASE_URL` is set, otherwise on the
//! in-memory stores.

use std::sync::Arc;

use api::config::Config;
use domain::{
    CreditHistoryStore, CreditService, CreditStore, OrderService, OrderStore, PgCreditHistoryStore,
    PgCreditStore, PgOrderStore, PgStockHistoryStore, PgStockStore, StockHistoryStore,
    StockService, StockStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{PgInboxStore, PgOutboxStore, run_migrations};
use saga::{InMemorySagaEngine, SagaEngine};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Spawns the engine's periodic tasks and serves the router until shutdown.
async fn serve<OS, CS, CH, SS, SH>(
    engine: Arc<SagaEngine<OS, CS, CH, SS, SH>>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) where
    OS: OrderStore + 'static,
    CS: CreditStore + 'static,
    CH: CreditHistoryStore + 'static,
    SS: StockStore + 'static,
    SH: StockHistoryStore + 'static,
{
    let sweeps = engine.spawn();
    let app = api::create_app(engine, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    for sweep in sweeps {
        sweep.abort();
    }
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to database");
            run_migrations(&pool)
                .await
                .expect("failed to run database migrations");

            let engine = Arc::new(
                SagaEngine::new(
                    OrderService::new(PgOrderStore::new(pool.clone())),
                    CreditService::new(
                        PgCreditStore::new(pool.clone()),
                        PgCreditHistoryStore::new(pool.clone()),
                    ),
                    StockService::new(
                        PgStockStore::new(pool.clone()),
                        PgStockHistoryStore::new(pool.clone()),
                    ),
                    Arc::new(PgOutboxStore::payment(pool.clone())),
                    Arc::new(PgOutboxStore::stock(pool.clone())),
                    Arc::new(PgInboxStore::credit(pool.clone())),
                    Arc::new(PgInboxStore::stock(pool)),
                )
                .with_poll_interval(config.poll_interval),
            );
            serve(engine, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, running on in-memory stores");
            let engine =
                Arc::new(InMemorySagaEngine::in_memory().with_poll_interval(config.poll_interval));
            serve(engine, &config, metrics_handle).await;
        }
    }
}
