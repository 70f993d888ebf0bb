use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use gatewarden_api::AppState;
use gatewarden_config::{Cli, IntervalUnit, LockMode, LogFormat, MergeMode};
use gatewarden_core::{
    logging, parse_time_of_day, DistLock, EntrySource, JobSpec, LocalFileSource, LocalLock,
    LockManager, MergePipeline, MergePolicy, Refresher, RemoteSource, Schedule, Scheduler,
    SnapshotCache,
};
use gatewarden_storage::{MemoryBackend, StorageBackend};
use gatewarden_types::{AllowListEntry, Error};

/// Name of the single refresh job; doubles as its fleet-wide lock key.
const REFRESH_JOB: &str = "allowlist-refresh";

/// Placeholder remote for policies that never consult one. Fails loudly if a
/// policy change ever routes a fetch here.
struct NoRemote;

#[async_trait]
impl EntrySource for NoRemote {
    async fn fetch(&self) -> gatewarden_types::Result<Vec<AllowListEntry>> {
        Err(Error::source("no remote authority configured"))
    }

    fn label(&self) -> &'static str {
        "remote"
    }
}

fn merge_policy(mode: MergeMode) -> MergePolicy {
    match mode {
        MergeMode::RemoteFirst => MergePolicy::RemoteFirst,
        MergeMode::RemoteFirstTolerant => MergePolicy::RemoteFirstTolerant,
        MergeMode::LocalFirst => MergePolicy::LocalFirst,
        MergeMode::LocalFirstTolerant => MergePolicy::LocalFirstTolerant,
        MergeMode::RemoteOnly => MergePolicy::RemoteOnly,
        MergeMode::LocalOnly => MergePolicy::LocalOnly,
    }
}

fn interval_unit(unit: IntervalUnit) -> gatewarden_core::IntervalUnit {
    match unit {
        IntervalUnit::Seconds => gatewarden_core::IntervalUnit::Seconds,
        IntervalUnit::Minutes => gatewarden_core::IntervalUnit::Minutes,
        IntervalUnit::Hours => gatewarden_core::IntervalUnit::Hours,
        IntervalUnit::Days => gatewarden_core::IntervalUnit::Days,
        IntervalUnit::Weeks => gatewarden_core::IntervalUnit::Weeks,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    config.validate()?;

    // Initialize structured logging
    let log_config = logging::LogConfig {
        format: match config.log_format {
            LogFormat::Json => logging::LogFormat::Json,
            LogFormat::Text => logging::LogFormat::Full,
            LogFormat::Auto => {
                if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                    logging::LogFormat::Full
                } else {
                    logging::LogFormat::Json
                }
            },
        },
        filter: Some(config.log_level.clone()),
        ..Default::default()
    };

    if let Err(e) = logging::init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    gatewarden_api::init_exporter();

    if config.is_dev_mode() {
        tracing::info!("Development mode enabled via --dev-mode flag: using local lock");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        merge_mode = %config.merge_mode,
        refresh_every = config.refresh_every,
        refresh_unit = %config.refresh_unit,
        lock = %config.effective_lock(),
        "Starting Gatewarden"
    );

    // Cross-instance refresh lock. Store mode also hands the backend to the
    // API so readiness reflects lock-store connectivity.
    let (lock, lock_store): (Arc<dyn LockManager>, Option<Arc<dyn StorageBackend>>) =
        match config.effective_lock() {
            LockMode::Local => (Arc::new(LocalLock::new()), None),
            LockMode::Store => {
                tracing::warn!(
                    "Lock mode 'store' is backed by the in-process memory store; it does \
                     not exclude other instances until an external backend is wired in"
                );
                let backend = MemoryBackend::new();
                (Arc::new(DistLock::new(backend.clone())), Some(Arc::new(backend)))
            },
        };

    // Allowlist sources and merge pipeline
    let local: Arc<dyn EntrySource> = Arc::new(LocalFileSource::new(config.local_path.clone()));
    let remote: Arc<dyn EntrySource> = match config.remote_url.as_ref() {
        // validate() guarantees a URL whenever the policy consults the remote
        Some(url) => Arc::new(RemoteSource::new(url, config.remote_auth.clone())?),
        None => Arc::new(NoRemote),
    };
    let pipeline = MergePipeline::new(merge_policy(config.merge_mode), local, remote);

    let cache = SnapshotCache::new();
    let refresher = Arc::new(Refresher::new(pipeline, cache.clone()));

    // Refresh schedule
    let at = config.refresh_at.as_deref().map(parse_time_of_day).transpose()?;
    let weekday = config
        .refresh_weekday
        .as_deref()
        .map(|w| w.parse::<chrono::Weekday>())
        .transpose()
        .map_err(|_| Error::config("--refresh-weekday is not a weekday name"))?;
    let schedule = Schedule::builder()
        .every(config.refresh_every)
        .unit(interval_unit(config.refresh_unit))
        .maybe_at(at)
        .maybe_weekday(weekday)
        .build();

    let spec = JobSpec::builder()
        .name(REFRESH_JOB)
        .schedule(schedule)
        .maybe_timeout(config.refresh_timeout_secs.map(Duration::from_secs))
        .lock_key(REFRESH_JOB)
        .tags(vec!["allowlist".to_string()])
        .build();

    let scheduler = Arc::new(Scheduler::new(lock));
    {
        let refresher = Arc::clone(&refresher);
        scheduler
            .register(spec, move || {
                let refresher = Arc::clone(&refresher);
                async move { refresher.run_cycle().await }
            })
            .await?;
    }
    scheduler.start().await;

    let state = AppState::builder()
        .cache(cache)
        .scheduler(Arc::clone(&scheduler))
        .refresh_job(REFRESH_JOB.to_string())
        .maybe_lock_store(lock_store)
        .build();

    gatewarden_api::serve(state, &config).await?;

    scheduler.stop().await;
    tracing::info!("Shutting down gracefully");
    Ok(())
}
