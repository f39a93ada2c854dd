//! HTTP API server for the storefront order engine.
//!
//! Exposes order placement, order history and the admin order tools over
//! REST, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{IdentityProvider, OrderEngine, OrderQueryService};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub engine: OrderEngine<S>,
    pub orders: OrderQueryService<S>,
    pub store: S,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Creates the application state over a store and identity provider.
pub fn create_state<S: OrderStore + Clone + 'static>(
    store: S,
    identity: Arc<dyn IdentityProvider>,
    transaction_timeout: Duration,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        engine: OrderEngine::with_timeout(store.clone(), transaction_timeout),
        orders: OrderQueryService::new(store.clone()),
        store,
        identity,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<S>))
        .route("/orders/my-orders", get(routes::orders::mine::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", patch(routes::orders::update_status::<S>))
        .route("/admin/orders", get(routes::admin::list_orders::<S>))
        .route(
            "/admin/orders/{id}/tracking",
            post(routes::admin::add_tracking::<S>),
        )
        .route("/admin/products", post(routes::admin::create_product::<S>))
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
