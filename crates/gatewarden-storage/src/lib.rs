//! Storage layer for Gatewarden's distributed coordination.
//!
//! # Types
//!
//! - [`StorageBackend`] - trait for the key-value operations the lock needs
//! - [`StorageError`] / [`StorageResult`] - canonical error types
//! - [`MemoryBackend`] - in-memory implementation of the same contract

#![deny(unsafe_code)]

pub mod backend;
pub mod memory;

pub use backend::{StorageBackend, StorageError, StorageResult};
pub use memory::MemoryBackend;
