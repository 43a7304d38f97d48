//! # Resync
//!
//! Re-enqueues every known Crypt on a fixed period, so payload changes in the
//! store and out-of-band edits to targets converge without a Crypt change.

use crate::controller::object_key;
use crate::controller::reconciler::TriggerSource;
use crate::crd::Crypt;
use crate::observability::metrics;
use crate::runtime::mirror::Mirror;
use crate::runtime::queue::WorkQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Enqueue every Crypt in the mirror, returning how many keys were added
pub fn enqueue_all(queue: &WorkQueue<String>, crypts: &Mirror<Crypt>) -> usize {
    let crypts = match crypts.list() {
        Ok(crypts) => crypts,
        Err(e) => {
            warn!(error = %e, "Skipping resync");
            return 0;
        }
    };

    let mut enqueued = 0;
    for key in crypts.iter().filter_map(|crypt| object_key(crypt.as_ref())) {
        queue.add(key);
        metrics::increment_requeues_total(TriggerSource::Resync.as_str());
        enqueued += 1;
    }
    enqueued
}

/// Enqueue every Crypt each `period` until the queue shuts down
///
/// The first tick fires one full period after start.
pub async fn resync_loop(queue: Arc<WorkQueue<String>>, crypts: Mirror<Crypt>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if queue.is_shutting_down() {
            break;
        }
        let enqueued = enqueue_all(&queue, &crypts);
        debug!(crypts = enqueued, "Resync enqueued Crypts");
    }
}
