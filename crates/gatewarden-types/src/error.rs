use std::backtrace::Backtrace;

use snafu::Snafu;

/// Result type alias for Gatewarden operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Gatewarden service
///
/// All variants include backtraces for debugging. Use the constructor methods
/// (e.g., `Error::validation("message")`) to create errors.
///
/// Lock contention is deliberately *not* an error: a denied acquisition is the
/// expected steady-state signal that a peer instance is already refreshing and
/// is reported as `Ok(false)` by the lock API. Only lock-store communication
/// failures surface here, as `Storage`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Configuration errors
    #[snafu(display("Configuration error: {message}"))]
    Config { message: String, backtrace: Backtrace },

    /// Validation errors (malformed time-of-day, bad entry shape, ...)
    #[snafu(display("Validation error: {message}"))]
    Validation { message: String, backtrace: Backtrace },

    /// Lock-store communication errors (distinct from contention)
    #[snafu(display("Storage error: {message}"))]
    Storage { message: String, backtrace: Backtrace },

    /// Allowlist source errors (remote fetch or local file read)
    #[snafu(display("Source error: {message}"))]
    Source { message: String, backtrace: Backtrace },

    /// A scheduled job ran past its configured timeout
    ///
    /// Distinct from `JobFailed` so callers can tell "ran and failed" from
    /// "did not finish in time".
    #[snafu(display("Job '{job}' timed out after {timeout_secs}s"))]
    JobTimeout { job: String, timeout_secs: u64, backtrace: Backtrace },

    /// A scheduled job body returned an error
    #[snafu(display("Job '{job}' failed: {message}"))]
    JobFailed { job: String, message: String, backtrace: Backtrace },

    /// Resource not found
    #[snafu(display("Resource not found: {message}"))]
    NotFound { message: String, backtrace: Backtrace },

    /// Internal system errors
    #[snafu(display("Internal error: {message}"))]
    Internal { message: String, backtrace: Backtrace },
}

impl Error {
    // =========================================================================
    // Constructors - capture backtraces at the point of creation
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ConfigSnafu { message: message.into() }.build()
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ValidationSnafu { message: message.into() }.build()
    }

    /// Create a storage (lock-store) error
    pub fn storage(message: impl Into<String>) -> Self {
        StorageSnafu { message: message.into() }.build()
    }

    /// Create a source error
    pub fn source(message: impl Into<String>) -> Self {
        SourceSnafu { message: message.into() }.build()
    }

    /// Create a job timeout error
    pub fn job_timeout(job: impl Into<String>, timeout_secs: u64) -> Self {
        JobTimeoutSnafu { job: job.into(), timeout_secs }.build()
    }

    /// Create a job failure error
    pub fn job_failed(job: impl Into<String>, message: impl Into<String>) -> Self {
        JobFailedSnafu { job: job.into(), message: message.into() }.build()
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        NotFoundSnafu { message: message.into() }.build()
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        InternalSnafu { message: message.into() }.build()
    }

    // =========================================================================
    // Metadata accessors
    // =========================================================================

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 500,
            Error::Validation { .. } => 400,
            Error::Storage { .. } => 500,
            Error::Source { .. } => 502,
            Error::JobTimeout { .. } => 504,
            Error::JobFailed { .. } => 500,
            Error::NotFound { .. } => 404,
            Error::Internal { .. } => 500,
        }
    }

    /// Get error code for client consumption
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "CONFIGURATION_ERROR",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Storage { .. } => "STORAGE_ERROR",
            Error::Source { .. } => "SOURCE_ERROR",
            Error::JobTimeout { .. } => "JOB_TIMEOUT",
            Error::JobFailed { .. } => "JOB_FAILED",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is a job timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::JobTimeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_matching_variants() {
        assert!(matches!(Error::config("x"), Error::Config { .. }));
        assert!(matches!(Error::validation("x"), Error::Validation { .. }));
        assert!(matches!(Error::storage("x"), Error::Storage { .. }));
        assert!(matches!(Error::source("x"), Error::Source { .. }));
        assert!(matches!(Error::not_found("x"), Error::NotFound { .. }));
        assert!(matches!(Error::internal("x"), Error::Internal { .. }));
    }

    #[test]
    fn timeout_is_distinct_from_failure() {
        let timeout = Error::job_timeout("refresh", 30);
        let failure = Error::job_failed("refresh", "remote unavailable");

        assert!(timeout.is_timeout());
        assert!(!failure.is_timeout());
        assert_eq!(timeout.error_code(), "JOB_TIMEOUT");
        assert_eq!(failure.error_code(), "JOB_FAILED");
    }

    #[test]
    fn display_includes_job_name_and_timeout() {
        let err = Error::job_timeout("allowlist_refresh", 15);
        let text = err.to_string();
        assert!(text.contains("allowlist_refresh"));
        assert!(text.contains("15s"));
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::validation("x").status_code(), 400);
        assert_eq!(Error::not_found("x").status_code(), 404);
        assert_eq!(Error::source("x").status_code(), 502);
        assert_eq!(Error::job_timeout("j", 1).status_code(), 504);
        assert_eq!(Error::internal("x").status_code(), 500);
    }
}
