use std::sync::Once;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

static METRICS_INIT: Once = Once::new();

/// Initialize Prometheus metrics descriptions
///
/// This should be called once during application startup.
/// It registers all metric names and descriptions with the metrics registry.
pub fn init() {
    METRICS_INIT.call_once(|| {
        // Counter metrics
        describe_counter!("http_requests_total", "Total number of HTTP requests received");
        describe_counter!(
            "gatewarden_refresh_cycles_total",
            "Total number of refresh cycles by outcome"
        );
        describe_counter!(
            "gatewarden_entries_dropped_total",
            "Total number of entries dropped for violating the identity invariant"
        );
        describe_counter!(
            "gatewarden_lock_denied_total",
            "Total number of refresh cycles skipped because a peer held the lock"
        );

        // Histogram metrics
        describe_histogram!("http_request_duration_seconds", "HTTP request duration in seconds");
        describe_histogram!(
            "gatewarden_refresh_duration_seconds",
            "Duration of a full refresh cycle in seconds"
        );

        // Gauge metrics
        describe_gauge!("gatewarden_allowlist_size", "Number of entries currently served");
    });
}

/// Record an HTTP request completion
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string(), "path" => path.to_string())
        .record(duration_secs);
}

/// Record a refresh cycle completion
///
/// # Arguments
///
/// * `outcome` - "changed", "unchanged", or "failed"
/// * `duration_secs` - Full cycle duration in seconds
pub fn record_refresh(outcome: &str, duration_secs: f64) {
    counter!("gatewarden_refresh_cycles_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("gatewarden_refresh_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record entries dropped during a snapshot rebuild
pub fn record_dropped_entries(count: usize) {
    if count > 0 {
        counter!("gatewarden_entries_dropped_total").increment(count as u64);
    }
}

/// Record a refresh cycle skipped due to lock contention
pub fn record_lock_denied(job: &str) {
    counter!("gatewarden_lock_denied_total", "job" => job.to_string()).increment(1);
}

/// Set the number of currently served allowlist entries
pub fn set_allowlist_size(count: usize) {
    gauge!("gatewarden_allowlist_size").set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Should not panic when called multiple times
        init();
        init();
    }

    #[test]
    fn test_record_refresh_metrics() {
        init();
        record_refresh("changed", 0.120);
        record_refresh("unchanged", 0.080);
        record_refresh("failed", 5.0);
        record_dropped_entries(0);
        record_dropped_entries(3);
        record_lock_denied("allowlist-refresh");
        set_allowlist_size(42);
    }

    #[test]
    fn test_record_http_request() {
        init();
        record_http_request("GET", "/v1/entries", 200, 0.001);
        record_http_request("GET", "/v1/entries/lookup", 404, 0.002);
    }
}
