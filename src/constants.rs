//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name reported on Kubernetes Events and used for the work queue
pub const CONTROLLER_NAME: &str = "crypt-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of parallel reconcile workers
pub const DEFAULT_WORKERS: usize = 3;

/// How long workers wait for the initial cache sync before startup fails (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 300;

/// Per-item exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Per-item exponential backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Grace period used when cascading deletes remove target secrets (seconds)
pub const DEFAULT_CLEANUP_GRACE_PERIOD_SECS: u32 = 5;

/// Period after which every Crypt is reconciled again (seconds, 0 disables)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Delay before a watch stream is re-established after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Secret type used when neither the definition nor the payload declares one
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Default KV v2 mount for the Vault store backend
pub const DEFAULT_VAULT_MOUNT: &str = "secret";

/// Default address for the Consul store backend
pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";

/// Default address for the Vault store backend
pub const DEFAULT_VAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Event reason emitted when a Crypt is synced
pub const REASON_SYNCED: &str = "Synced";

/// Event note emitted when a Crypt is synced
pub const MESSAGE_RESOURCE_SYNCED: &str = "Crypt synced successfully";

/// Event action recorded for convergence passes
pub const ACTION_RECONCILE: &str = "Reconcile";
