pub mod entries;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatewarden_core::{Scheduler, SnapshotCache};
use gatewarden_storage::StorageBackend;

pub use health::{healthz_handler, livez_handler, readyz_handler, startupz_handler};
pub use metrics::{init_exporter, metrics_handler};

/// Shared state for all request handlers.
#[derive(Clone, bon::Builder)]
pub struct AppState {
    /// The served allowlist snapshot.
    pub cache: SnapshotCache,
    /// Scheduler driving the refresh job, when one is wired in. Tests and
    /// local-only deployments may run without it.
    pub scheduler: Option<Arc<Scheduler>>,
    /// Name of the refresh job to report in health output.
    pub refresh_job: Option<String>,
    /// Lock store whose connectivity gates readiness, when store-mode
    /// locking is active.
    pub lock_store: Option<Arc<dyn StorageBackend>>,
    /// Process start time, for uptime reporting.
    #[builder(default = Utc::now())]
    pub started_at: DateTime<Utc>,
}
