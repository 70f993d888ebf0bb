//! # Gatewarden API
//!
//! REST surface for allowlist lookups, serving straight from the snapshot
//! cache maintained by `gatewarden-core`'s refresh loop.
//!
//! ## AppState Builder
//!
//! The [`AppState`] struct uses a builder for server initialization:
//!
//! ```no_run
//! use gatewarden_api::AppState;
//! use gatewarden_core::SnapshotCache;
//!
//! let state = AppState::builder()
//!     .cache(SnapshotCache::new())
//!     .maybe_scheduler(None)   // Optional refresh scheduler
//!     .maybe_refresh_job(None) // Job name reported by /healthz
//!     .build();
//! ```

#![deny(unsafe_code)]

use gatewarden_config::Config;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pagination;
pub mod routes;

pub use error::{ApiError, ErrorResponse, Result};
pub use handlers::{init_exporter, AppState};
pub use pagination::{Paginated, PaginationMeta, PaginationParams, PaginationQuery};
pub use routes::create_router_with_state;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating shutdown");
        }
    }
}

/// Start the Gatewarden HTTP server
pub async fn serve(state: AppState, config: &Config) -> anyhow::Result<()> {
    let router = routes::create_router_with_state(state);

    // Address is already validated in config
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;

    info!(listen = %config.listen, "Gatewarden ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    Ok(())
}
