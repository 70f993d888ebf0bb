// Test fixtures are allowed to use unwrap/expect for clear failure messages
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Test fixtures and utilities for Gatewarden integration tests.
//!
//! Shared helpers to eliminate duplication across integration tests. All
//! functions work with the Axum-based API and an in-process snapshot cache.
//!
//! # Usage
//!
//! ```rust,no_run
//! use gatewarden_test_fixtures::{create_test_app, create_test_state, seed_cache};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let state = create_test_state();
//!     seed_cache(&state).await;
//!     let app = create_test_app(state);
//!     // Drive requests via tower::ServiceExt::oneshot...
//! }
//! ```

#![deny(unsafe_code)]

use axum::body::Body;
use gatewarden_api::AppState;
use gatewarden_core::SnapshotCache;
use gatewarden_types::AllowListEntry;
use serde_json::Value;

/// Creates a test AppState with an empty snapshot cache and no scheduler.
pub fn create_test_state() -> AppState {
    AppState::builder().cache(SnapshotCache::new()).build()
}

/// Creates a fully configured Axum router with all middleware and routes.
pub fn create_test_app(state: AppState) -> axum::Router {
    gatewarden_api::create_router_with_state(state)
}

/// A small, varied entry set: phone-only, mail-only, and combined records.
pub fn sample_entries() -> Vec<AllowListEntry> {
    vec![
        AllowListEntry::builder().phone("15550001").role("admin").build(),
        AllowListEntry::builder().mail("bob@example.com").build(),
        AllowListEntry::builder()
            .phone("15550002")
            .mail("carol@example.com")
            .scope(vec!["read".to_string(), "write".to_string()])
            .build(),
    ]
}

/// Replace the state's cache contents with [`sample_entries`].
pub async fn seed_cache(state: &AppState) {
    state.cache.set(&sample_entries()).await;
}

/// Parses a response body as JSON.
///
/// # Panics
///
/// Panics if the body is not valid JSON, for clear test failures.
pub async fn body_json(response: axum::http::Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
