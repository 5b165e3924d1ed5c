//! Route definitions for the proxy.

pub mod health;
pub mod proxy;

use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::cors;
use crate::AppState;

/// Build the full router: `/health` plus the `/proxy/*` forwarding surface.
pub fn router(state: AppState) -> Router {
    let proxy_routes = Router::new()
        .route("/proxy/{*path}", any(proxy::forward))
        .layer(axum::middleware::from_fn(cors::proxy_headers));

    Router::new()
        .route("/health", get(health::health))
        .merge(proxy_routes)
        .layer(cors::cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
