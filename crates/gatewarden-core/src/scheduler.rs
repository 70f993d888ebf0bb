//! Periodic job scheduler driving the refresh loop.
//!
//! Jobs are registered once at startup as statically typed closures — the
//! closure captures its own arguments, so invocation never needs runtime
//! argument-count validation. The driver wakes on a fixed tick, dispatches
//! jobs whose next-run has arrived, and recomputes next-run after every
//! execution attempt, success or failure.
//!
//! # Execution wrapper
//!
//! Each dispatch runs the job body on an isolated worker task. When a
//! timeout is configured the scheduler races the worker against a timer and
//! reports a distinct timeout error if the worker has not reported
//! completion in time. This is best-effort abandonment, not forced
//! termination: the scheduler only stops *waiting* — the body must itself
//! observe cancellation (e.g. its own deadlines) to stop promptly.
//!
//! If a job declares a lock requirement, the lock is acquired before and
//! released after invocation, even on failure. A denied acquisition skips
//! the run — a peer instance is already on it.
//!
//! A failing job body never propagates into the driving loop; the error is
//! recorded on the job and logged.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use bon::Builder;
use chrono::{DateTime, Utc};
use gatewarden_const::duration::SCHEDULER_TICK;
use gatewarden_types::{Error, Result};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{lock::LockManager, schedule::Schedule};

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Static description of a job: identity, recurrence, and execution policy.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct JobSpec {
    /// Unique job name; doubles as the default lock key.
    pub name: String,
    /// Recurrence description.
    pub schedule: Schedule,
    /// Optional execution timeout for a single run.
    pub timeout: Option<Duration>,
    /// Lock key to hold around each run. None runs unguarded.
    pub lock_key: Option<String>,
    /// Free-form tags. Pure metadata with no scheduling effect.
    #[builder(default)]
    pub tags: Vec<String>,
    /// Run once immediately after registration instead of waiting for the
    /// first interval.
    #[builder(default = true)]
    pub run_immediately: bool,
}

/// Observable state of a registered job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub name: String,
    pub tags: Vec<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub last_error: Option<String>,
    pub runs: u64,
}

struct Job {
    spec: JobSpec,
    run: JobFn,
    last_run: Option<DateTime<Utc>>,
    next_run: DateTime<Utc>,
    last_error: Option<String>,
    runs: u64,
    running: bool,
}

/// Periodic scheduler owning a registry of named jobs.
///
/// An explicit instance rather than process-global state: whatever wires the
/// bootstrap owns it, and tests can run several independent schedulers in
/// one process.
pub struct Scheduler {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    lock: Arc<dyn LockManager>,
    tick: Duration,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler using `lock` for jobs that declare a lock
    /// requirement.
    pub fn new(lock: Arc<dyn LockManager>) -> Self {
        Self { jobs: Arc::new(Mutex::new(HashMap::new())), lock, tick: SCHEDULER_TICK, driver: Mutex::new(None) }
    }

    /// Override the driver tick (tests).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Register a job.
    ///
    /// The closure captures everything the job needs, so there is no
    /// argument shape to validate at invocation time. Fails if a job with
    /// the same name is already registered or the interval magnitude is
    /// zero.
    pub async fn register<F, Fut>(&self, spec: JobSpec, body: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if spec.name.trim().is_empty() {
            return Err(Error::validation("job name must not be empty"));
        }
        if spec.schedule.every == 0 {
            return Err(Error::validation(format!(
                "job '{}' interval magnitude must be at least 1",
                spec.name
            )));
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&spec.name) {
            return Err(Error::validation(format!("job '{}' is already registered", spec.name)));
        }

        let now = Utc::now();
        let next_run = if spec.run_immediately { now } else { spec.schedule.next_run(now, now) };

        tracing::info!(
            job = %spec.name,
            every = spec.schedule.every,
            unit = %spec.schedule.unit,
            next_run = %next_run,
            "Registered job"
        );

        jobs.insert(
            spec.name.clone(),
            Job {
                spec,
                run: Arc::new(move || Box::pin(body()) as JobFuture),
                last_run: None,
                next_run,
                last_error: None,
                runs: 0,
                running: false,
            },
        );
        Ok(())
    }

    // ── Tag operations (pure metadata) ───────────────────────────────

    /// Add a tag to a job. No scheduling effect.
    pub async fn add_tag(&self, job: &str, tag: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job)
            .ok_or_else(|| Error::not_found(format!("job '{job}' is not registered")))?;
        let tag = tag.into();
        if !job.spec.tags.contains(&tag) {
            job.spec.tags.push(tag);
        }
        Ok(())
    }

    /// Remove a tag from a job.
    pub async fn remove_tag(&self, job: &str, tag: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job)
            .ok_or_else(|| Error::not_found(format!("job '{job}' is not registered")))?;
        job.spec.tags.retain(|t| t != tag);
        Ok(())
    }

    /// Names of jobs carrying `tag`.
    pub async fn jobs_by_tag(&self, tag: &str) -> Vec<String> {
        let jobs = self.jobs.lock().await;
        let mut names: Vec<String> = jobs
            .values()
            .filter(|job| job.spec.tags.iter().any(|t| t == tag))
            .map(|job| job.spec.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of a job's observable state.
    pub async fn status(&self, job: &str) -> Option<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.get(job).map(|job| JobStatus {
            name: job.spec.name.clone(),
            tags: job.spec.tags.clone(),
            last_run: job.last_run,
            next_run: job.next_run,
            last_error: job.last_error.clone(),
            runs: job.runs,
        })
    }

    /// Start the driver loop.
    ///
    /// Idempotent: a second call replaces nothing and logs a warning.
    pub async fn start(self: &Arc<Self>) {
        let mut driver = self.driver.lock().await;
        if driver.is_some() {
            tracing::warn!("Scheduler already started");
            return;
        }

        let scheduler = Arc::clone(self);
        *driver = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick);
            loop {
                interval.tick().await;
                scheduler.dispatch_due(Utc::now()).await;
            }
        }));

        tracing::info!("Scheduler started");
    }

    /// Stop the driver loop. In-flight job bodies are not interrupted.
    pub async fn stop(&self) {
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
        }
        tracing::info!("Scheduler stopped");
    }

    /// Dispatch every job whose next-run has arrived.
    ///
    /// Exposed for tests that drive time explicitly; the driver loop calls
    /// this on each tick.
    pub async fn dispatch_due(self: &Arc<Self>, now: DateTime<Utc>) {
        let due: Vec<String> = {
            let mut jobs = self.jobs.lock().await;
            jobs.values_mut()
                .filter(|job| !job.running && now >= job.next_run)
                .map(|job| {
                    job.running = true;
                    job.last_run = Some(now);
                    job.spec.name.clone()
                })
                .collect()
        };

        for name in due {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.execute(&name).await;
            });
        }
    }

    /// Run one job attempt end to end and record the outcome.
    async fn execute(&self, name: &str) {
        let (run, spec, started) = {
            let jobs = self.jobs.lock().await;
            let Some(job) = jobs.get(name) else { return };
            (Arc::clone(&job.run), job.spec.clone(), job.last_run.unwrap_or_else(Utc::now))
        };

        let outcome = self.run_guarded(&spec, run).await;

        match &outcome {
            Outcome::Completed(Ok(())) => {
                tracing::debug!(job = name, "Job completed");
            },
            Outcome::Completed(Err(e)) => {
                tracing::error!(job = name, error = %e, "Job failed");
            },
            Outcome::Skipped => {
                tracing::debug!(job = name, "Skipping job (lock held by peer)");
                crate::metrics::record_lock_denied(name);
            },
        }

        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(name) {
            job.running = false;
            job.runs += 1;
            job.last_error = match outcome {
                Outcome::Completed(Err(e)) => Some(e.to_string()),
                _ => None,
            };
            job.next_run = job.spec.schedule.next_run(started, Utc::now());
        }
    }

    /// Acquire the job's lock (when required), run the body with its
    /// timeout, and release the lock even on failure.
    async fn run_guarded(&self, spec: &JobSpec, run: JobFn) -> Outcome {
        let Some(lock_key) = spec.lock_key.as_deref() else {
            return Outcome::Completed(Self::run_bounded(spec, run).await);
        };

        match self.lock.acquire(lock_key).await {
            Ok(false) => Outcome::Skipped,
            Err(e) => Outcome::Completed(Err(e)),
            Ok(true) => {
                let result = Self::run_bounded(spec, run).await;
                if let Err(e) = self.lock.release(lock_key).await {
                    tracing::error!(job = %spec.name, error = %e, "Failed to release job lock");
                }
                Outcome::Completed(result)
            },
        }
    }

    /// Run the body on an isolated worker, racing it against the configured
    /// timeout. On timeout the worker is abandoned, not killed.
    async fn run_bounded(spec: &JobSpec, run: JobFn) -> Result<()> {
        let worker = tokio::spawn(run());

        let joined = match spec.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The abandoned body keeps running until it observes its
                    // own deadlines; we only stop waiting for it.
                    return Err(Error::job_timeout(&spec.name, timeout.as_secs()));
                },
            },
            None => worker.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) => Err(Error::job_failed(&spec.name, format!("job body panicked: {e}"))),
        }
    }
}

enum Outcome {
    Completed(Result<()>),
    Skipped,
}
