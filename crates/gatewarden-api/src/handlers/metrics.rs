//! Prometheus metrics endpoint.

use std::sync::OnceLock;

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register metric descriptions.
///
/// The metrics crate supports one global recorder per process; calling this
/// more than once keeps the first installation. Tests sharing a process
/// therefore see a single registry, which is fine for scrape-shaped output.
pub fn init_exporter() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            gatewarden_core::metrics::init();
        },
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed, reusing it");
        },
    }
}

/// Render the current metrics in Prometheus exposition format.
///
/// GET /metrics
pub async fn metrics_handler() -> Result<String, StatusCode> {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
