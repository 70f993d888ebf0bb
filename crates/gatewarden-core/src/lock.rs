//! Cross-instance mutual exclusion for refresh cycles.
//!
//! Exposes one acquire/release contract ([`LockManager`]) with two
//! implementations so the scheduler's lock requirement stays
//! deployment-mode-agnostic:
//!
//! - [`DistLock`] holds the lock in an external key-value store with a
//!   bounded lease, so at most one fleet member runs a given refresh and a
//!   crashed holder cannot deadlock future cycles.
//! - [`LocalLock`] tracks held keys in process memory for single-instance
//!   deployments and tests.
//!
//! Denied acquisition is not an error — it is the expected steady-state
//! signal that a peer is already refreshing. Only store communication
//! failures surface as errors.

use std::{collections::{HashMap, HashSet}, time::Duration};

use async_trait::async_trait;
use gatewarden_const::duration::{LOCK_LEASE_TTL, LOCK_OP_TIMEOUT};
use gatewarden_storage::StorageBackend;
use gatewarden_types::{Error, Result};
use tokio::sync::Mutex;

/// Acquire/release contract shared by all lock implementations.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Try to acquire the lock for `key`.
    ///
    /// Returns `Ok(true)` when this caller now owns the lock, `Ok(false)`
    /// when another owner holds it. Errors are store failures only.
    async fn acquire(&self, key: &str) -> Result<bool>;

    /// Release the lock for `key`.
    ///
    /// Must be called after every acquisition, including when the guarded
    /// work failed.
    async fn release(&self, key: &str) -> Result<()>;
}

/// Distributed lock backed by an external key-value store.
///
/// Acquire atomically sets `key → ownership token` only if absent, with a
/// bounded expiry; the token is generated per acquisition and retained so
/// release can verify ownership. Release deletes the key only if its stored
/// value still equals our token, as a single atomic read-compare-delete on
/// the store side — a lock that expired and was re-acquired by a peer
/// between our read and delete is therefore never removed.
///
/// When no record of ever owning the key exists (e.g. after a process
/// restart), release degrades to an unconditional delete for backward
/// compatibility. This can remove a peer's live lock; construct with
/// [`DistLock::strict`] to refuse the unconditional delete and no-op
/// instead.
///
/// Every store operation is bounded by a fixed operation timeout,
/// independent of the lease itself.
pub struct DistLock<S: StorageBackend> {
    storage: S,
    lease_ttl: Duration,
    op_timeout: Duration,
    strict_release: bool,
    /// key → ownership token for acquisitions made by this instance.
    held: Mutex<HashMap<String, String>>,
}

impl<S: StorageBackend> DistLock<S> {
    /// Create a lock with the default lease TTL and legacy release fallback.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            lease_ttl: LOCK_LEASE_TTL,
            op_timeout: LOCK_OP_TIMEOUT,
            strict_release: false,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Create a lock that refuses the unconditional-delete release fallback.
    pub fn strict(storage: S) -> Self {
        Self { strict_release: true, ..Self::new(storage) }
    }

    /// Override the lease TTL.
    ///
    /// The lease must exceed the worst-case guarded-section latency or
    /// legitimate refreshes will self-preempt.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    fn store_key(key: &str) -> Vec<u8> {
        format!("lock/{key}").into_bytes()
    }

    fn generate_token() -> String {
        format!("{:032x}", rand::random::<u128>())
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = gatewarden_storage::StorageResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::storage(format!("lock store {op} failed: {e}"))),
            Err(_) => Err(Error::storage(format!(
                "lock store {op} timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

#[async_trait]
impl<S: StorageBackend> LockManager for DistLock<S> {
    async fn acquire(&self, key: &str) -> Result<bool> {
        let token = Self::generate_token();
        let inserted = self
            .bounded(
                "acquire",
                self.storage.set_if_absent_with_ttl(
                    Self::store_key(key),
                    token.clone().into_bytes(),
                    self.lease_ttl,
                ),
            )
            .await?;

        if inserted {
            self.held.lock().await.insert(key.to_string(), token);
            tracing::debug!(key, "Acquired distributed lock");
            Ok(true)
        } else {
            tracing::debug!(key, "Lock held by another owner");
            Ok(false)
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        let token = self.held.lock().await.remove(key);

        match token {
            Some(token) => {
                let deleted = self
                    .bounded(
                        "release",
                        self.storage.compare_and_delete(&Self::store_key(key), token.as_bytes()),
                    )
                    .await?;
                if deleted {
                    tracing::debug!(key, "Released distributed lock");
                } else {
                    // Lease expired and a peer re-acquired; their lock stays
                    tracing::debug!(key, "Lock already expired or owned by another instance");
                }
                Ok(())
            },
            None if self.strict_release => {
                tracing::warn!(key, "No ownership record for lock; strict mode skips release");
                Ok(())
            },
            None => {
                // Legacy fallback: without an ownership record we cannot
                // verify the token, so delete unconditionally. Can remove a
                // peer's live lock after a restart.
                tracing::warn!(key, "No ownership record for lock; deleting unconditionally");
                self.bounded("release", self.storage.delete(&Self::store_key(key))).await
            },
        }
    }
}

/// In-process lock implementing the same contract.
///
/// Tracks a guarded set of held keys: acquire fails if the key is already
/// present, release simply removes it. Neither operation ever errors, and
/// keys are implicitly released on process exit.
#[derive(Debug, Default)]
pub struct LocalLock {
    held: Mutex<HashSet<String>>,
}

impl LocalLock {
    /// Create a lock holding no keys.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for LocalLock {
    async fn acquire(&self, key: &str) -> Result<bool> {
        Ok(self.held.lock().await.insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.held.lock().await.remove(key);
        Ok(())
    }
}
