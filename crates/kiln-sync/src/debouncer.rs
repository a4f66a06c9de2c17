//! Keyed debouncing for sync work.
//!
//! Coalesces repeated triggers for the same key into one pending task whose
//! deadline restarts on every trigger. Work for a key runs once, after the key
//! has been quiet for the debounce delay.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Thread-safe keyed debouncer.
///
/// Keys are drained in key order, so callers control relative ordering of
/// tasks that become ready together through the key's `Ord` implementation.
pub struct Debouncer<K> {
    pending: Mutex<BTreeMap<K, Instant>>,
    delay: Duration,
    notify: Notify,
}

impl<K: Ord + Clone> Debouncer<K> {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            delay,
            notify: Notify::new(),
        }
    }

    /// Quiet period before a key becomes ready.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a trigger for `key`, restarting its deadline.
    pub fn record(&self, key: K) {
        self.record_at(key, Instant::now());
    }

    /// Record a trigger for `key` as if it happened at `now`.
    pub fn record_at(&self, key: K, now: Instant) {
        self.lock().insert(key, now + self.delay);
        self.notify.notify_one();
    }

    /// Forget a pending key. Returns whether it was pending.
    pub fn cancel(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Forget every pending key matching `predicate`.
    pub fn cancel_where(&self, predicate: impl Fn(&K) -> bool) {
        self.lock().retain(|key, _| !predicate(key));
    }

    /// Forget every pending key.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove and return keys whose deadline has passed.
    pub fn drain_ready(&self) -> Vec<K> {
        self.drain_ready_at(Instant::now())
    }

    /// Remove and return keys whose deadline is at or before `now`.
    pub fn drain_ready_at(&self, now: Instant) -> Vec<K> {
        let mut pending = self.lock();
        let ready: Vec<K> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            pending.remove(key);
        }
        ready
    }

    /// Remove and return every pending key regardless of deadline.
    pub fn drain_all(&self) -> Vec<K> {
        std::mem::take(&mut *self.lock()).into_keys().collect()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().values().min().copied()
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until a key is recorded.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<K, Instant>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DELAY: Duration = Duration::from_millis(100);

    #[test]
    fn test_single_key_ready_after_deadline() {
        let debouncer = Debouncer::new(DELAY);
        let start = Instant::now();

        debouncer.record_at("index", start);

        assert!(debouncer.drain_ready_at(start).is_empty());
        assert_eq!(debouncer.drain_ready_at(start + DELAY), vec!["index"]);
        assert!(debouncer.drain_ready_at(start + DELAY).is_empty());
    }

    #[test]
    fn test_repeated_triggers_coalesce_and_restart() {
        let debouncer = Debouncer::new(DELAY);
        let start = Instant::now();

        debouncer.record_at("buffer", start);
        debouncer.record_at("buffer", start + Duration::from_millis(50));
        debouncer.record_at("buffer", start + Duration::from_millis(90));

        assert!(debouncer.drain_ready_at(start + DELAY).is_empty());
        assert_eq!(
            debouncer.drain_ready_at(start + Duration::from_millis(190)),
            vec!["buffer"]
        );
    }

    #[test]
    fn test_keys_are_independent_and_ordered() {
        let debouncer = Debouncer::new(DELAY);
        let start = Instant::now();

        debouncer.record_at(2, start);
        debouncer.record_at(1, start);
        debouncer.record_at(3, start + DELAY);

        assert_eq!(debouncer.drain_ready_at(start + DELAY), vec![1, 2]);
        assert_eq!(debouncer.next_deadline(), Some(start + DELAY + DELAY));
    }

    #[test]
    fn test_drain_all_ignores_deadlines() {
        let debouncer = Debouncer::new(DELAY);

        debouncer.record("a");
        debouncer.record("b");

        assert_eq!(debouncer.drain_all(), vec!["a", "b"]);
        assert!(debouncer.is_empty());
        assert_eq!(debouncer.next_deadline(), None);
    }

    #[test]
    fn test_cancel() {
        let debouncer = Debouncer::new(DELAY);
        debouncer.record("a");
        debouncer.record("b");
        debouncer.record("c");

        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));
        debouncer.cancel_where(|k| *k == "b");

        assert!(debouncer.is_pending(&"c"));
        assert_eq!(debouncer.drain_all(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_record_wakes_waiter() {
        let debouncer = Debouncer::new(DELAY);

        debouncer.record("a");

        // The permit stored by `record` completes the wait immediately.
        tokio::time::timeout(Duration::from_secs(1), debouncer.notified())
            .await
            .unwrap();
    }
}
