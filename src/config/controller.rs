//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// What happens to target secrets when their Crypt is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupMode {
    /// Leave targets to the cluster's owner-reference garbage collection
    #[default]
    Orphan,
    /// Delete every target the Crypt controls as soon as the Crypt goes away
    Cascade,
}

impl FromStr for CleanupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orphan" | "" => Ok(CleanupMode::Orphan),
            "cascade" => Ok(CleanupMode::Cascade),
            other => Err(format!("unknown cleanup mode: {other}")),
        }
    }
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupMode::Orphan => f.write_str("orphan"),
            CleanupMode::Cascade => f.write_str("cascade"),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of parallel reconcile workers
    pub workers: usize,
    /// How long workers wait for the initial cache sync (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Per-item exponential backoff starting value (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-item exponential backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after the stream ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Every Crypt is re-enqueued this often (seconds, 0 disables)
    pub resync_period_secs: u64,
    /// Target cleanup behavior on Crypt deletion
    pub cleanup_mode: CleanupMode,
    /// Grace period for cascade deletes (seconds)
    pub cleanup_grace_period_secs: u32,
    /// Port for /metrics, /healthz and /readyz
    pub metrics_port: u16,
    /// Serve metrics and probes
    pub enable_metrics: bool,
    /// Publish Kubernetes Events for synced Crypts
    pub enable_events: bool,
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_WORKERS,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            cleanup_mode: CleanupMode::Orphan,
            cleanup_grace_period_secs: DEFAULT_CLEANUP_GRACE_PERIOD_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            enable_metrics: true,
            enable_events: true,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            workers: env_var_or_default(&lookup, "WORKERS", DEFAULT_WORKERS).max(1),
            cache_sync_timeout_secs: env_var_or_default(
                &lookup,
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            backoff_base_ms: env_var_or_default(&lookup, "BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default(
                &lookup,
                "BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            resync_period_secs: env_var_or_default(
                &lookup,
                "RESYNC_PERIOD_SECS",
                DEFAULT_RESYNC_PERIOD_SECS,
            ),
            cleanup_mode: env_var_or_default(&lookup, "CLEANUP_MODE", CleanupMode::Orphan),
            cleanup_grace_period_secs: env_var_or_default(
                &lookup,
                "CLEANUP_GRACE_PERIOD_SECS",
                DEFAULT_CLEANUP_GRACE_PERIOD_SECS,
            ),
            metrics_port: env_var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            enable_metrics: env_var_or_default_bool(&lookup, "ENABLE_METRICS", true),
            enable_events: env_var_or_default_bool(&lookup, "ENABLE_EVENTS", true),
            log_level: env_var_or_default_str(&lookup, "LOG_LEVEL", "info"),
            log_format: env_var_or_default_str(&lookup, "LOG_FORMAT", "json"),
        }
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    pub fn backoff_base_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Resync period, `None` when disabled
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_secs > 0).then(|| Duration::from_secs(self.resync_period_secs))
    }
}

/// Read a variable or return default value
fn env_var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a variable as boolean or return default
fn env_var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read a variable as string or return default
fn env_var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}
