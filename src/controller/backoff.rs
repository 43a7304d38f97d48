//! # Per-Item Exponential Backoff
//!
//! Tracks how many times each work-queue key has failed and hands out the
//! delay before its next retry: `base * 2^failures`, capped at `max`.
//!
//! Keys are independent. A key that keeps failing climbs toward `max` while
//! other keys still retry quickly. Calling [`ItemExponentialBackoff::forget`]
//! after a successful pass resets the key.
//!
//! ## Usage
//!
//! ```rust
//! use crypt_controller::controller::backoff::ItemExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(backoff.when(&"test/foo"), Duration::from_millis(5));
//! assert_eq!(backoff.when(&"test/foo"), Duration::from_millis(10));
//! assert_eq!(backoff.when(&"test/foo"), Duration::from_millis(20));
//! assert_eq!(backoff.when(&"test/bar"), Duration::from_millis(5));
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Per-key exponential backoff calculator
///
/// Safe to share between workers; all state sits behind a mutex.
#[derive(Debug)]
pub struct ItemExponentialBackoff<K> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K> ItemExponentialBackoff<K>
where
    K: Eq + Hash + Clone,
{
    /// Create a backoff starting at `base` and never exceeding `max`
    ///
    /// # Example
    ///
    /// ```
    /// use crypt_controller::controller::backoff::ItemExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let backoff: ItemExponentialBackoff<String> =
    ///     ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
    /// ```
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying it
    ///
    /// # Example
    ///
    /// ```
    /// use crypt_controller::controller::backoff::ItemExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let backoff = ItemExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(3));
    /// assert_eq!(backoff.when(&1), Duration::from_secs(1));
    /// assert_eq!(backoff.when(&1), Duration::from_secs(2));
    /// assert_eq!(backoff.when(&1), Duration::from_secs(3)); // capped
    /// ```
    pub fn when(&self, key: &K) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.clone()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Number of failures recorded for `key` since it was last forgotten
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Clear the failure history for `key`
    pub fn forget(&self, key: &K) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> ItemExponentialBackoff<String> {
        ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000))
    }

    #[test]
    fn test_exponential_sequence() {
        let backoff = backoff();
        let key = "test/foo".to_string();

        // 5ms, 10ms, 20ms, 40ms, 80ms
        assert_eq!(backoff.when(&key), Duration::from_millis(5));
        assert_eq!(backoff.when(&key), Duration::from_millis(10));
        assert_eq!(backoff.when(&key), Duration::from_millis(20));
        assert_eq!(backoff.when(&key), Duration::from_millis(40));
        assert_eq!(backoff.when(&key), Duration::from_millis(80));
        assert_eq!(backoff.num_requeues(&key), 5);
    }

    #[test]
    fn test_max_cap() {
        let backoff = backoff();
        let key = "test/foo".to_string();

        // 5ms * 2^17 = 655.36s, 5ms * 2^18 = 1310.72s -> capped
        for _ in 0..18 {
            backoff.when(&key);
        }
        assert_eq!(backoff.when(&key), Duration::from_secs(1000));
        // Should stay at max, including once the exponent overflows
        for _ in 0..100 {
            assert_eq!(backoff.when(&key), Duration::from_secs(1000));
        }
    }

    #[test]
    fn test_forget_resets_key() {
        let backoff = backoff();
        let key = "test/foo".to_string();

        backoff.when(&key);
        backoff.when(&key);
        backoff.when(&key);

        backoff.forget(&key);

        assert_eq!(backoff.num_requeues(&key), 0);
        assert_eq!(backoff.when(&key), Duration::from_millis(5));
    }

    #[test]
    fn test_keys_are_independent() {
        let backoff = backoff();
        let foo = "test/foo".to_string();
        let bar = "test/bar".to_string();

        backoff.when(&foo);
        backoff.when(&foo);
        assert_eq!(backoff.when(&bar), Duration::from_millis(5));
        assert_eq!(backoff.when(&foo), Duration::from_millis(20));

        backoff.forget(&bar);
        assert_eq!(backoff.num_requeues(&foo), 3);
    }

    #[test]
    fn test_forget_unknown_key_is_noop() {
        let backoff = backoff();
        backoff.forget(&"never-seen".to_string());
        assert_eq!(backoff.num_requeues(&"never-seen".to_string()), 0);
    }
}
