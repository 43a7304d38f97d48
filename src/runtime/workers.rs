//! # Workers
//!
//! A fixed pool of tasks pulling keys from the shared work queue. Workers start
//! only after every mirror has synced; a sync that exceeds the timeout is fatal.

use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::runtime::error_policy;
use crate::runtime::mirror::MirrorError;
use crate::runtime::queue::WorkQueue;
use crate::runtime::resync;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};

/// Take one key off the queue and run a pass for it
///
/// Returns false once the queue is shutting down.
pub async fn process_next_work_item(queue: &Arc<WorkQueue<String>>, reconciler: &Reconciler) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    let result = reconciler.sync(&key).await;
    error_policy::handle_sync_result(queue, &key, &result);
    queue.done(&key);
    true
}

async fn worker_loop(id: usize, queue: Arc<WorkQueue<String>>, reconciler: Arc<Reconciler>) {
    while process_next_work_item(&queue, &reconciler).await {}
    info!(worker = id, "Worker stopped");
}

/// Wait for caches, run `workers` workers until `shutdown` resolves, then drain
///
/// With a `resync_period`, every Crypt is re-enqueued once per period while the
/// workers run. In-flight passes run to completion; queued keys are abandoned.
#[allow(clippy::too_many_arguments, reason = "startup wiring passed straight from main")]
pub async fn run<F>(
    queue: Arc<WorkQueue<String>>,
    reconciler: Arc<Reconciler>,
    workers: usize,
    cache_sync_timeout: Duration,
    resync_period: Option<Duration>,
    server_state: Option<Arc<ServerState>>,
    shutdown: F,
) -> Result<(), MirrorError>
where
    F: Future<Output = ()>,
{
    info!("Waiting for caches to sync (timeout {}s)", cache_sync_timeout.as_secs());
    if let Err(e) = reconciler.wait_for_caches(cache_sync_timeout).await {
        error!(error = %e, "Caches failed to sync");
        return Err(e);
    }

    info!(workers, queue = queue.name(), "Caches synced, starting workers");
    let handles: Vec<_> = (0..workers.max(1))
        .map(|id| {
            let queue = Arc::clone(&queue);
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(worker_loop(id, queue, reconciler).instrument(info_span!("worker", id)))
        })
        .collect();

    let resync = resync_period.map(|period| {
        info!("Resyncing every Crypt every {}s", period.as_secs());
        tokio::spawn(resync::resync_loop(
            Arc::clone(&queue),
            reconciler.crypts().clone(),
            period,
        ))
    });

    if let Some(state) = &server_state {
        state.set_ready(true);
    }

    shutdown.await;

    if let Some(resync) = resync {
        resync.abort();
    }

    info!("Shutting down workers");
    if let Some(state) = &server_state {
        state.set_ready(false);
    }
    queue.shut_down();

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task failed");
        }
    }
    info!("All workers stopped");
    Ok(())
}
