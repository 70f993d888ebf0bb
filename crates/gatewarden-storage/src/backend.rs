//! Storage backend trait for distributed coordination.
//!
//! Gatewarden needs very little from its lock store: atomic
//! set-if-absent-with-expiry and an atomic compare-and-delete. Any external
//! key-value store offering those two primitives (or an equivalent
//! transactional one) can implement [`StorageBackend`]; the in-memory
//! [`MemoryBackend`](crate::MemoryBackend) implements the same contract for
//! development, testing, and single-instance deployments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use snafu::Snafu;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Canonical error types for storage operations.
///
/// `Conflict` marks optimistic-concurrency losses and is handled distinctly
/// from communication failures by callers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// An atomic operation lost to a concurrent writer
    #[snafu(display("Storage conflict: {message}"))]
    Conflict { message: String },

    /// Communication or backend failure
    #[snafu(display("Storage I/O error: {message}"))]
    Io { message: String },
}

impl StorageError {
    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }
}

/// Core trait for key-value storage operations.
///
/// Keys are raw bytes; values are [`Bytes`]. All operations are async and
/// multi-instance safe.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the value stored under `key`, if any.
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Set `key` to `value` unconditionally.
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically set `key` to `value` only if the key is absent, with a
    /// bounded time-to-live after which the store expires it.
    ///
    /// Returns `Ok(true)` if the key was inserted, `Ok(false)` if a live
    /// value already exists. Losing this race is expected steady-state
    /// behavior, not an error.
    async fn set_if_absent_with_ttl(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<bool>;

    /// Atomically delete `key` only if its current value equals `expected`.
    ///
    /// The read-compare-delete must be a single server-side operation so a
    /// concurrent expiry-plus-reacquire between read and delete cannot remove
    /// another owner's value. Returns `Ok(true)` if the key was deleted,
    /// `Ok(false)` if the value did not match or the key was absent.
    async fn compare_and_delete(&self, key: &[u8], expected: &[u8]) -> StorageResult<bool>;

    /// Delete `key` unconditionally.
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Check backend connectivity.
    async fn health_check(&self) -> StorageResult<()>;
}
