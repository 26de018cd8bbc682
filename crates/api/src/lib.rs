//! HTTP API server for the dual-replica inventory and order system.
//!
//! Provides REST endpoints for pieces, orders and document-replica
//! catch-up, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::FulfillmentEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use replica_store::ReplicaStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, D>(state: Arc<AppState<R, D>>, metrics_handle: PrometheusHandle) -> Router
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<R, D>))
        .route(
            "/pieces",
            post(routes::pieces::create::<R, D>).get(routes::pieces::list::<R, D>),
        )
        .route("/pieces/low-stock", get(routes::pieces::low_stock::<R, D>))
        .route(
            "/pieces/{id}",
            get(routes::pieces::get::<R, D>)
                .patch(routes::pieces::update::<R, D>)
                .delete(routes::pieces::delete::<R, D>),
        )
        .route(
            "/orders",
            post(routes::orders::create::<R, D>).get(routes::orders::list::<R, D>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<R, D>)
                .patch(routes::orders::update::<R, D>)
                .delete(routes::orders::delete::<R, D>),
        )
        .route(
            "/replication/pending",
            get(routes::replication::pending::<R, D>),
        )
        .route(
            "/replication/replay",
            post(routes::replication::replay::<R, D>),
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

/// Creates the application state over the given replicas.
pub fn create_default_state<R, D>(relational: R, document: D) -> Arc<AppState<R, D>>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let engine = Arc::new(FulfillmentEngine::new(relational, document));
    let catalog = engine.catalog();
    Arc::new(AppState { engine, catalog })
}
