//! Request-level middleware.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Log every request and record its metrics.
///
/// Uses the matched route pattern when available so path parameters do not
/// explode metric cardinality.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let status = response.status();
    gatewarden_core::metrics::record_http_request(
        method.as_str(),
        &path,
        status.as_u16(),
        elapsed.as_secs_f64(),
    );

    if status.is_server_error() {
        tracing::error!(%method, %path, %status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
    } else {
        tracing::debug!(%method, %path, %status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
    }

    response
}
