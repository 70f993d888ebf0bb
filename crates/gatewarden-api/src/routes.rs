use axum::{middleware, routing::get, Router};

use crate::{
    handlers::{entries, health, metrics as metrics_handler, AppState},
    middleware::logging_middleware,
};

/// Create router with state and middleware applied
///
/// All allowlist endpoints are read-only; authentication is the reverse
/// proxy's concern, not this service's.
pub fn create_router_with_state(state: AppState) -> axum::Router {
    Router::new()
        // Health check endpoints (Kubernetes API server conventions)
        .route("/livez", get(health::livez_handler))
        .route("/readyz", get(health::readyz_handler))
        .route("/startupz", get(health::startupz_handler))
        .route("/healthz", get(health::healthz_handler))
        // Metrics endpoint
        .route("/metrics", get(metrics_handler::metrics_handler))
        // Allowlist lookup endpoints
        .route("/gate/v1/entries", get(entries::list_entries))
        .route("/gate/v1/entries/by-phone/{phone}", get(entries::get_by_phone))
        .route("/gate/v1/entries/by-mail/{mail}", get(entries::get_by_mail))
        .route("/gate/v1/entries/by-user-id/{user_id}", get(entries::get_by_user_id))
        .route("/gate/v1/digest", get(entries::get_digest))
        .with_state(state)
        // Log all requests and record request metrics
        .layer(middleware::from_fn(logging_middleware))
}
