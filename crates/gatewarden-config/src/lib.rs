//! # Gatewarden Configuration
//!
//! CLI-first configuration for the allowlist gatekeeper. Uses `clap::Parser`
//! for argument parsing with environment variable fallbacks, and
//! `bon::Builder` for ergonomic test construction without CLI/env
//! interference.
//!
//! ```no_run
//! use gatewarden_config::{Cli, Config};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! let config = cli.config;
//! config.validate().expect("invalid configuration");
//! ```
//!
//! ```no_run
//! use gatewarden_config::{Config, MergeMode};
//!
//! let config = Config::builder()
//!     .merge_mode(MergeMode::RemoteFirstTolerant)
//!     .remote_url("https://authority.example.com/allowlist")
//!     .build();
//! ```

#![deny(unsafe_code)]

use std::{net::SocketAddr, path::PathBuf};

use bon::Builder;
use clap::Parser;
use gatewarden_types::{Error, Result};

/// Default HTTP listen address.
const DEFAULT_LISTEN: &str = "127.0.0.1:8085";

/// Default local allowlist file path.
const DEFAULT_LOCAL_PATH: &str = "./data/allowlist.json";

/// Default log level filter string.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default refresh interval magnitude.
const DEFAULT_REFRESH_EVERY: u64 = 60;

/// Merge policy selection.
///
/// The priority source is seeded first; the secondary source contributes
/// only entries whose dedup key is not already present. Tolerant variants
/// degrade to the other source when the priority fetch fails instead of
/// failing the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MergeMode {
    /// Remote is the priority source; remote failure is fatal to the cycle.
    #[default]
    RemoteFirst,
    /// Remote is the priority source; on remote failure, fall back to local.
    RemoteFirstTolerant,
    /// Local is the priority source; local failure is fatal to the cycle.
    LocalFirst,
    /// Local is the priority source; on local failure, fall back to remote.
    LocalFirstTolerant,
    /// Only the remote source is consulted.
    RemoteOnly,
    /// Only the local source is consulted.
    LocalOnly,
}

/// Refresh interval unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// Distributed lock backing selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockMode {
    /// In-process lock. Correct for single-instance deployments only.
    #[default]
    Local,
    /// Lock held in the configured key-value store, shared across the fleet.
    Store,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Automatically detect: JSON for non-TTY stdout, text otherwise.
    #[default]
    Auto,
    /// JSON structured logging (recommended for production).
    Json,
    /// Human-readable text format.
    Text,
}

/// Command-line interface for Gatewarden.
#[derive(Debug, Parser)]
#[command(name = "gatewarden")]
#[command(version)]
pub struct Cli {
    /// Server configuration (flattened so flags appear at top level).
    #[command(flatten)]
    pub config: Config,
}

/// Configuration for the Gatewarden allowlist service.
///
/// All fields are configurable via CLI flags or environment variables.
/// Precedence: CLI arg > env var > default value.
///
/// The remote authorization header (`remote_auth`) uses `hide_env_values`
/// to prevent leaking secrets in `--help` output.
#[derive(Debug, Clone, Builder, Parser)]
#[command(name = "gatewarden")]
#[command(version)]
#[builder(on(String, into))]
pub struct Config {
    // ── Server ───────────────────────────────────────────────────────
    /// HTTP bind address.
    #[arg(long = "listen", env = "GATEWARDEN__LISTEN", default_value = DEFAULT_LISTEN)]
    #[builder(default = default_listen())]
    pub listen: SocketAddr,

    /// Tracing-subscriber filter string (e.g., info, debug, trace).
    #[arg(long = "log-level", env = "GATEWARDEN__LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    #[builder(default = DEFAULT_LOG_LEVEL.to_string())]
    pub log_level: String,

    /// Log output format: auto, json, or text.
    #[arg(long = "log-format", env = "GATEWARDEN__LOG_FORMAT", value_enum, default_value = "auto")]
    #[builder(default)]
    pub log_format: LogFormat,

    // ── Allowlist sources ────────────────────────────────────────────
    /// Path to the local allowlist JSON file. Absence of the file is
    /// treated as an empty source, not an error.
    #[arg(long = "local-path", env = "GATEWARDEN__LOCAL_PATH", default_value = DEFAULT_LOCAL_PATH)]
    #[builder(default = PathBuf::from(DEFAULT_LOCAL_PATH))]
    pub local_path: PathBuf,

    /// Remote authority URL returning a JSON array of identity records.
    #[arg(long = "remote-url", env = "GATEWARDEN__REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Authorization header value forwarded verbatim to the remote authority.
    #[arg(long = "remote-auth", env = "GATEWARDEN__REMOTE_AUTH", hide_env_values = true)]
    pub remote_auth: Option<String>,

    /// Merge policy applied each refresh cycle.
    #[arg(
        long = "merge-mode",
        env = "GATEWARDEN__MERGE_MODE",
        value_enum,
        default_value = "remote-first"
    )]
    #[builder(default)]
    pub merge_mode: MergeMode,

    // ── Refresh schedule ─────────────────────────────────────────────
    /// Refresh interval magnitude.
    #[arg(long = "refresh-every", env = "GATEWARDEN__REFRESH_EVERY", default_value_t = DEFAULT_REFRESH_EVERY)]
    #[builder(default = DEFAULT_REFRESH_EVERY)]
    pub refresh_every: u64,

    /// Refresh interval unit: seconds, minutes, hours, days, or weeks.
    #[arg(
        long = "refresh-unit",
        env = "GATEWARDEN__REFRESH_UNIT",
        value_enum,
        default_value = "seconds"
    )]
    #[builder(default)]
    pub refresh_unit: IntervalUnit,

    /// Time-of-day anchor for day/week intervals, as HH:MM or HH:MM:SS.
    #[arg(long = "refresh-at", env = "GATEWARDEN__REFRESH_AT")]
    pub refresh_at: Option<String>,

    /// Start weekday for week intervals (e.g. mon, tuesday).
    #[arg(long = "refresh-weekday", env = "GATEWARDEN__REFRESH_WEEKDAY")]
    pub refresh_weekday: Option<String>,

    /// Execution timeout for a single refresh cycle, in seconds.
    #[arg(long = "refresh-timeout", env = "GATEWARDEN__REFRESH_TIMEOUT")]
    pub refresh_timeout_secs: Option<u64>,

    // ── Distributed lock ─────────────────────────────────────────────
    /// Lock backing: local (single instance) or store (fleet-wide).
    #[arg(long = "lock", env = "GATEWARDEN__LOCK", value_enum, default_value = "local")]
    #[builder(default)]
    pub lock: LockMode,

    // ── Mode Flags ───────────────────────────────────────────────────
    /// Force development mode: local lock and relaxed source validation.
    /// No environment variable — this must be an explicit CLI choice.
    #[arg(long = "dev-mode")]
    #[builder(default)]
    pub dev_mode: bool,
}

fn default_listen() -> SocketAddr {
    #[allow(clippy::expect_used)]
    DEFAULT_LISTEN.parse().expect("valid default listen address")
}

impl Config {
    /// Validate cross-field business rules.
    ///
    /// Must be called after parsing and before using the config. Checks that
    /// remote-consuming merge modes have a remote URL, URL scheme shape, and
    /// interval sanity.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_every == 0 {
            return Err(Error::config("--refresh-every must be at least 1"));
        }

        if self.requires_remote() {
            let Some(url) = self.remote_url.as_ref() else {
                return Err(Error::config(format!(
                    "--remote-url is required when merge-mode={}",
                    self.merge_mode
                )));
            };
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::config(format!(
                    "--remote-url must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.remote_url.as_deref().is_some_and(|u| u.starts_with("http://")) && !self.dev_mode {
            tracing::warn!(
                "--remote-url uses plain http — allowlist payloads will not be encrypted in transit"
            );
        }

        if !matches!(self.refresh_unit, IntervalUnit::Days | IntervalUnit::Weeks)
            && self.refresh_at.is_some()
        {
            return Err(Error::config("--refresh-at only applies to day or week intervals"));
        }

        if let Some(weekday) = self.refresh_weekday.as_deref() {
            if self.refresh_unit != IntervalUnit::Weeks {
                return Err(Error::config("--refresh-weekday only applies to week intervals"));
            }
            if weekday.parse::<chrono::Weekday>().is_err() {
                return Err(Error::config(format!(
                    "--refresh-weekday is not a weekday name: {weekday}"
                )));
            }
        }

        Ok(())
    }

    /// Whether the selected merge mode consults the remote source at all.
    pub fn requires_remote(&self) -> bool {
        !matches!(self.merge_mode, MergeMode::LocalOnly)
    }

    /// Returns the effective lock mode, accounting for dev-mode override.
    ///
    /// When `dev_mode` is true, always returns `Local` regardless of the
    /// `lock` field value.
    pub fn effective_lock(&self) -> LockMode {
        if self.dev_mode { LockMode::Local } else { self.lock }
    }

    /// Returns whether dev-mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}
