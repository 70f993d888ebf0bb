//! Allowlist entry sources: local JSON file and remote HTTP authority.
//!
//! Both implement [`EntrySource`] so the merge pipeline stays agnostic of
//! where a list came from. Parsing stops at deserialization; normalization
//! and validation happen downstream in the pipeline and cache.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gatewarden_const::{
    duration::{FETCH_BACKOFF_BASE, FETCH_CONNECT_TIMEOUT, FETCH_MAX_ATTEMPTS, FETCH_TIMEOUT},
    limits::{MAX_LOCAL_FILE_BYTES, MAX_REMOTE_BODY_BYTES},
};
use gatewarden_types::{AllowListEntry, Error, Result};

/// A fetchable list of allowlist entries.
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Fetch the full entry list from this source.
    async fn fetch(&self) -> Result<Vec<AllowListEntry>>;

    /// Short label for logs.
    fn label(&self) -> &'static str;
}

/// JSON array of identity records at a configured path.
///
/// An absent file is an empty source, not an error, so a deployment without
/// local overrides needs no placeholder file.
pub struct LocalFileSource {
    path: PathBuf,
    max_bytes: u64,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_bytes: MAX_LOCAL_FILE_BYTES }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EntrySource for LocalFileSource {
    async fn fetch(&self) -> Result<Vec<AllowListEntry>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Local allowlist absent, treating as empty");
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(Error::source(format!(
                    "failed to stat local allowlist {}: {e}",
                    self.path.display()
                )));
            },
        };

        if metadata.len() > self.max_bytes {
            return Err(Error::source(format!(
                "local allowlist {} is {} bytes, exceeding the {} byte ceiling",
                self.path.display(),
                metadata.len(),
                self.max_bytes
            )));
        }

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::source(format!("failed to read local allowlist {}: {e}", self.path.display()))
        })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::source(format!("local allowlist {} is not a JSON entry array: {e}", self.path.display()))
        })
    }

    fn label(&self) -> &'static str {
        "local"
    }
}

/// HTTP GET against the remote authority, with bounded retry.
///
/// Network errors and 5xx responses are retried with linearly increasing
/// backoff; 4xx responses are not retried — the request is wrong, not the
/// network. Each attempt carries its own request timeout and the response
/// body is capped to bound memory use. The overall pipeline deadline is
/// enforced by the caller dropping this future: every await point here
/// (connect, body read, backoff sleep) is a cancellation point.
pub struct RemoteSource {
    client: reqwest::Client,
    url: String,
    auth: Option<String>,
    max_attempts: u32,
    max_body_bytes: u64,
}

impl RemoteSource {
    /// Build a source for `url`, forwarding `auth` verbatim as the
    /// `Authorization` header when set.
    pub fn new(url: impl Into<String>, auth: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            auth,
            max_attempts: FETCH_MAX_ATTEMPTS,
            max_body_bytes: MAX_REMOTE_BODY_BYTES,
        })
    }

    /// Override the attempt bound (tests).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn fetch_once(&self) -> std::result::Result<Vec<AllowListEntry>, FetchFailure> {
        let mut request = self.client.get(&self.url);
        if let Some(auth) = self.auth.as_deref() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(FetchFailure::retryable)?;
        let status = response.status();

        if status.is_server_error() {
            return Err(FetchFailure::retryable(format!("remote returned {status}")));
        }
        if !status.is_success() {
            return Err(FetchFailure::fatal(format!("remote returned {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(FetchFailure::fatal(format!(
                    "remote body is {len} bytes, exceeding the {} byte ceiling",
                    self.max_body_bytes
                )));
            }
        }

        let body = response.bytes().await.map_err(FetchFailure::retryable)?;
        if body.len() as u64 > self.max_body_bytes {
            return Err(FetchFailure::fatal(format!(
                "remote body is {} bytes, exceeding the {} byte ceiling",
                body.len(),
                self.max_body_bytes
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| FetchFailure::fatal(format!("remote body is not a JSON entry array: {e}")))
    }
}

#[async_trait]
impl EntrySource for RemoteSource {
    async fn fetch(&self) -> Result<Vec<AllowListEntry>> {
        let mut attempt = 1u32;
        loop {
            match self.fetch_once().await {
                Ok(entries) => return Ok(entries),
                Err(failure) if failure.retryable && attempt < self.max_attempts => {
                    let backoff = FETCH_BACKOFF_BASE * attempt;
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure.message,
                        "Remote fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(failure) => {
                    return Err(Error::source(format!(
                        "remote fetch from {} failed after {attempt} attempt(s): {}",
                        self.url, failure.message
                    )));
                },
            }
        }
    }

    fn label(&self) -> &'static str {
        "remote"
    }
}

struct FetchFailure {
    message: String,
    retryable: bool,
}

impl FetchFailure {
    fn retryable(message: impl ToString) -> Self {
        Self { message: message.to_string(), retryable: true }
    }

    fn fatal(message: impl ToString) -> Self {
        Self { message: message.to_string(), retryable: false }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        io::Write,
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
    };

    use axum::{extract::State, http::StatusCode, routing::get, Router};

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/allowlist")
    }

    // ── Local file source ────────────────────────────────────────────

    #[tokio::test]
    async fn absent_file_is_an_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFileSource::new(dir.path().join("missing.json"));
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_json_entry_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"phone":"1"}},{{"mail":"A@X.com"}}]"#).unwrap();

        let source = LocalFileSource::new(file.path());
        let entries = source.fetch().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phone, "1");
        assert_eq!(entries[1].mail, "A@X.com"); // not yet normalized
    }

    #[tokio::test]
    async fn malformed_json_is_a_source_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let source = LocalFileSource::new(file.path());
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let source = LocalFileSource { path: file.path().to_path_buf(), max_bytes: 1 };
        let err = source.fetch().await.unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    // ── Remote source ────────────────────────────────────────────────

    #[tokio::test]
    async fn fetches_remote_entry_array() {
        let router = Router::new()
            .route("/allowlist", get(|| async { r#"[{"phone":"2"}]"# }));
        let url = serve(router).await;

        let source = RemoteSource::new(url, None).unwrap();
        let entries = source.fetch().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].phone, "2");
    }

    #[tokio::test]
    async fn forwards_authorization_header_verbatim() {
        let router = Router::new().route(
            "/allowlist",
            get(|headers: axum::http::HeaderMap| async move {
                if headers.get("authorization").map(|v| v.to_str().unwrap()) == Some("Bearer s3cret")
                {
                    (StatusCode::OK, "[]".to_string())
                } else {
                    (StatusCode::UNAUTHORIZED, String::new())
                }
            }),
        );
        let url = serve(router).await;

        let source = RemoteSource::new(url, Some("Bearer s3cret".to_string())).unwrap();
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_5xx_until_success() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/allowlist",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                    } else {
                        (StatusCode::OK, r#"[{"phone":"3"}]"#.to_string())
                    }
                }),
            )
            .with_state(Arc::clone(&hits));
        let url = serve(router).await;

        let source = RemoteSource::new(url, None).unwrap();
        let entries = source.fetch().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_4xx() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/allowlist",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::FORBIDDEN, String::new())
                }),
            )
            .with_state(Arc::clone(&hits));
        let url = serve(router).await;

        let source = RemoteSource::new(url, None).unwrap();
        assert!(source.fetch().await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
    }

    #[tokio::test]
    async fn retry_bound_is_honored() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/allowlist",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, String::new())
                }),
            )
            .with_state(Arc::clone(&hits));
        let url = serve(router).await;

        let source = RemoteSource::new(url, None).unwrap().with_max_attempts(2);
        let err = source.fetch().await.unwrap_err();
        assert!(err.to_string().contains("after 2 attempt(s)"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_remote_body_is_rejected() {
        let router = Router::new()
            .route("/allowlist", get(|| async { r#"[{"phone":"1"}]"# }));
        let url = serve(router).await;

        let mut source = RemoteSource::new(url, None).unwrap();
        source.max_body_bytes = 4;
        let err = source.fetch().await.unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    #[tokio::test]
    async fn connection_refused_is_retried_then_surfaced() {
        // Bind-then-drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = RemoteSource::new(format!("http://{addr}/allowlist"), None)
            .unwrap()
            .with_max_attempts(2);
        let err = source.fetch().await.unwrap_err();
        assert!(err.to_string().contains("after 2 attempt(s)"));
    }
}
