//! # Gatewarden Core
//!
//! The refresh control loop keeping the served allowlist fresh across a
//! fleet: a periodic [`scheduler`](crate::scheduler) drives refresh cycles,
//! a [`lock`](crate::lock) ensures only one fleet member performs a given
//! refresh at a time, a [`merge`](crate::merge) pipeline reconciles the
//! local file and the remote authority under a failure-tolerance policy,
//! and a [`cache`](crate::cache) serves concurrent lookups without blocking
//! on refreshes.
//!
//! This crate owns no wire protocol; it is a library layer wired into the
//! HTTP front end (`gatewarden-api`) and the process bootstrap
//! (`gatewarden`).

#![deny(unsafe_code)]

pub mod cache;
pub mod lock;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod refresh;
pub mod schedule;
pub mod scheduler;
pub mod source;

pub use cache::{digest_of, RebuildStats, SnapshotCache};
pub use lock::{DistLock, LocalLock, LockManager};
pub use merge::{MergePipeline, MergePolicy};
pub use refresh::Refresher;
pub use schedule::{parse_time_of_day, IntervalUnit, Schedule};
pub use scheduler::{JobSpec, JobStatus, Scheduler};
pub use source::{EntrySource, LocalFileSource, RemoteSource};
