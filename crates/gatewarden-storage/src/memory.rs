//! In-memory storage backend.
//!
//! Thread-safe key-value store with TTL support, implementing the same
//! contract as an external lock store. Expired keys are dropped lazily on
//! access, so no background sweeper is needed. Data is lost on restart.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{StorageBackend, StorageResult};

#[derive(Debug, Clone)]
struct Stored {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory storage backend for development, tests, and single-instance
/// deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<Vec<u8>, Stored>>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(stored) if !stored.is_expired() => Ok(Some(stored.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.insert(key, Stored { value: Bytes::from(value), expires_at: None });
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<bool> {
        let mut data = self.data.write().await;
        if let Some(existing) = data.get(&key) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }
        data.insert(key, Stored { value: Bytes::from(value), expires_at: Some(Instant::now() + ttl) });
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &[u8], expected: &[u8]) -> StorageResult<bool> {
        let mut data = self.data.write().await;
        match data.get(key) {
            Some(stored) if !stored.is_expired() && stored.value.as_ref() == expected => {
                data.remove(key);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
