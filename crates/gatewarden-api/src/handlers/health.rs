//! Health check endpoints following Kubernetes API server conventions
//! (`/livez`, `/readyz`, `/startupz`, `/healthz`).

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::handlers::AppState;

/// Liveness probe: the process is up and answering.
///
/// GET /livez
pub async fn livez_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: the service can serve lookups.
///
/// An empty cache is still ready — the service serves the (empty) snapshot
/// while the first refresh is in flight. When store-mode locking is active,
/// the lock store's connectivity gates readiness: an unreachable store
/// means refresh cycles cannot coordinate.
///
/// GET /readyz
pub async fn readyz_handler(State(state): State<AppState>) -> StatusCode {
    if let Some(store) = &state.lock_store {
        if let Err(e) = store.health_check().await {
            tracing::warn!(error = %e, "Readiness check failed: lock store unreachable");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}

/// Startup probe, delegating to readiness.
///
/// GET /startupz
pub async fn startupz_handler(State(state): State<AppState>) -> StatusCode {
    readyz_handler(State(state)).await
}

/// Detailed health report.
///
/// GET /healthz
pub async fn healthz_handler(State(state): State<AppState>) -> Json<Value> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds().max(0);

    let refresh = match (&state.scheduler, &state.refresh_job) {
        (Some(scheduler), Some(job)) => match scheduler.status(job).await {
            Some(status) => json!({
                "job": status.name,
                "runs": status.runs,
                "last_run": status.last_run,
                "next_run": status.next_run,
                "last_error": status.last_error,
            }),
            None => json!(null),
        },
        _ => json!(null),
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
        "allowlist": {
            "entries": state.cache.len().await,
            "digest": state.cache.digest().await,
        },
        "refresh": refresh,
    }))
}
