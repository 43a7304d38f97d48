//! # Error Policy
//!
//! What happens to a work-queue key after a pass, and how watch stream errors
//! are reported.

use crate::controller::reconciler::{ReconcilerError, SyncReport, TriggerSource};
use crate::observability::metrics;
use crate::runtime::queue::WorkQueue;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Decision taken for a finished pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Success: failure history cleared
    Forget,
    /// Structural failure: requeued with per-key backoff
    Requeue,
    /// Non-retryable failure: dropped
    Drop,
}

/// Apply the retry policy for `key`. The caller still owes `queue.done(key)`.
pub fn handle_sync_result(
    queue: &Arc<WorkQueue<String>>,
    key: &str,
    result: &Result<SyncReport, ReconcilerError>,
) -> Decision {
    let key_owned = key.to_string();
    match result {
        Ok(_) => {
            queue.forget(&key_owned);
            Decision::Forget
        }
        Err(e) if e.is_retryable() => {
            let attempts = queue.num_requeues(&key_owned) + 1;
            error!(crypt.key = %key, attempts, error = %e, "Sync failed, requeueing with backoff");
            metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
            queue.add_rate_limited(key_owned);
            Decision::Requeue
        }
        Err(e) => {
            error!(crypt.key = %key, error = %e, "Dropping key that can never succeed");
            queue.forget(&key_owned);
            Decision::Drop
        }
    }
}

/// Log a watch stream error for a mirrored `kind`
///
/// The watcher backs off and re-lists on its own; this only classifies the
/// error so operators can tell RBAC problems from routine expiry.
pub fn log_watch_error(kind: &str, error: &kube_runtime::watcher::Error) {
    let error_string = error.to_string();

    let is_not_found = error_string.contains("404") || error_string.contains("not found");
    let is_401 = (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_403 = error_string.contains("403") || error_string.contains("Forbidden");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");

    if is_401 || is_403 {
        error!(
            kind,
            error = %error_string,
            "Watch not authorized - check the controller's ClusterRole grants list/watch on {}",
            kind
        );
    } else if is_410 {
        debug!(kind, error = %error_string, "Watch resource version expired, relisting");
    } else if is_not_found {
        error!(
            kind,
            error = %error_string,
            "Watched resource not found - is the {} CRD installed?",
            kind
        );
    } else {
        warn!(kind, error = %error_string, "Watch stream error");
    }
}
