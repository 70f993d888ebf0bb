//! Shared types for the Gatewarden allowlist service.
//!
//! Contains the [`AllowListEntry`] identity record with its normalization and
//! dedup-key rules, and the service-wide [`Error`] taxonomy.

#![deny(unsafe_code)]

pub mod entry;
pub mod error;

pub use entry::{AllowListEntry, DEFAULT_STATUS, derive_user_id};
pub use error::{Error, Result};
