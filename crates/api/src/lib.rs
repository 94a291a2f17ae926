//! HTTP API server for the marketplace order-fulfillment core.
//!
//! Provides REST endpoints for carts, checkout, order fulfillment and the
//! product catalog, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

pub use state::{AppState, Backend};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, St>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    sessions: SessionManagerLayer<St>,
) -> Router
where
    S: Backend,
    St: SessionStore + Clone,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let cart_router = Router::new()
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/add", post(routes::cart::add::<S>))
        .route("/cart/update/{product_id}", put(routes::cart::update::<S>))
        .route("/cart/remove/{product_id}", delete(routes::cart::remove::<S>))
        .route("/cart/clear", delete(routes::cart::clear::<S>))
        .route("/cart/checkout", post(routes::cart::checkout::<S>))
        .layer(sessions);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/products/{id}", delete(routes::products::remove::<S>))
        .route("/products/{id}/restock", post(routes::products::restock::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}", delete(routes::orders::delete::<S>))
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/payment", get(routes::orders::payment::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route(
            "/orders/items/{id}/status",
            patch(routes::orders::update_item_status::<S>),
        )
        .merge(cart_router)
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
