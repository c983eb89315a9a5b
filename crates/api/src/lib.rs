//! HTTP API server with observability for the order-placement service.
//!
//! Provides REST endpoints for placing and reading orders and for managing
//! stock, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryPaymentService, InventoryLedger, SagaConfig, SagaCoordinator};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use store::{
    InMemoryOrderStore, InMemoryStockStore, OrderStore, PostgresOrderStore, PostgresStockStore,
    StockStore, StoreError,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Storage};

/// State backed by in-memory stores.
pub type MemoryState = AppState<InMemoryOrderStore, InMemoryStockStore>;

/// State backed by PostgreSQL.
pub type PostgresState = AppState<PostgresOrderStore, PostgresStockStore>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O, S>(state: Arc<AppState<O, S>>, metrics_handle: PrometheusHandle) -> Router
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<O, S>))
        .route(
            "/orders",
            post(routes::orders::place::<O, S>).get(routes::orders::list::<O, S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<O, S>))
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::get::<O, S>),
        )
        .route(
            "/inventory/{product_id}/restock",
            post(routes::inventory::restock::<O, S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state on in-memory stores with the in-process
/// payment adapter.
pub fn create_memory_state(config: SagaConfig) -> Arc<MemoryState> {
    let coordinator = SagaCoordinator::with_config(
        InMemoryOrderStore::new(),
        InventoryLedger::new(InMemoryStockStore::new()),
        InMemoryPaymentService::new(),
        config,
    );

    Arc::new(AppState {
        coordinator,
        storage: Storage::Memory,
    })
}

/// Creates application state on PostgreSQL with the in-process payment
/// adapter.
pub fn create_postgres_state(pool: PgPool, config: SagaConfig) -> Arc<PostgresState> {
    let coordinator = SagaCoordinator::with_config(
        PostgresOrderStore::new(pool.clone()),
        InventoryLedger::new(PostgresStockStore::new(pool.clone())),
        InMemoryPaymentService::new(),
        config,
    );

    Arc::new(AppState {
        coordinator,
        storage: Storage::Postgres(pool),
    })
}

/// Connects to PostgreSQL and applies pending migrations.
pub async fn connect_postgres(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    store::run_migrations(&pool).await?;
    Ok(pool)
}
