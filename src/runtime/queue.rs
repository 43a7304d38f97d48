//! # Work Queue
//!
//! A deduplicating, rate-limited queue of reconcile keys shared by every worker.
//!
//! Guarantees:
//! - a key sits in the queue at most once, however many times it is added
//! - a key is never handed to two workers at the same time; adding a key that is
//!   being processed marks it dirty and it is re-queued when [`WorkQueue::done`]
//!   is called
//! - after [`WorkQueue::shut_down`], adds are ignored and [`WorkQueue::get`]
//!   returns `None` right away, even if keys are still queued

use crate::controller::backoff::ItemExponentialBackoff;
use crate::observability::metrics;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            shutting_down: false,
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue<K> {
    name: &'static str,
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff: ItemExponentialBackoff<K>,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(name: &'static str, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff: ItemExponentialBackoff::new(backoff_base, backoff_max),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue `key` unless it is already waiting
    pub fn add(&self, key: K) {
        let depth = {
            let mut state = self.lock();
            if state.shutting_down || state.dirty.contains(&key) {
                return;
            }
            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                trace!(queue = self.name, key = ?key, "Key is being processed, marked dirty");
                return;
            }
            state.queue.push_back(key);
            state.queue.len()
        };
        metrics::set_queue_depth(depth);
        self.notify.notify_one();
    }

    /// Enqueue `key` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Enqueue `key` after its per-item backoff delay and record the failure
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.backoff.when(&key);
        trace!(queue = self.name, key = ?key, delay_ms = delay.as_millis(), "Rate-limited requeue");
        self.add_after(key, delay);
    }

    /// Clear the failure history for `key`
    pub fn forget(&self, key: &K) {
        self.backoff.forget(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.backoff.num_requeues(key)
    }

    /// Wait for the next key; `None` once the queue is shutting down
    ///
    /// The returned key must be handed back with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let depth = state.queue.len();
                    drop(state);
                    metrics::set_queue_depth(depth);
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished; re-queues it if it was added while in flight
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                Some(state.queue.len())
            } else {
                None
            }
        };
        if let Some(depth) = requeued {
            metrics::set_queue_depth(depth);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting (excluding keys in flight)
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
