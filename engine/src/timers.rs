//! Keyed deadline table for cooperative, single-threaded timers.
//!
//! Each key owns at most one pending deadline. Scheduling a key that is
//! already armed replaces its deadline, so callers never have to remember
//! to cancel first. Nothing here sleeps: the owner calls `pop_expired` with
//! the current time and acts on whatever has come due.

use std::fmt::Debug;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Entry<K> {
    key: K,
    deadline: Instant,
    /// Insertion counter; orders timers that share a deadline.
    seq: u64,
}

/// Pending deadlines, at most one per key.
#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    entries: Vec<Entry<K>>,
    next_seq: u64,
}

impl<K: Copy + Eq + Debug> TimerSet<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Arm `key` to fire at `deadline`, replacing any pending deadline for it.
    pub fn schedule(&mut self, key: K, deadline: Instant) {
        self.cancel(key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { key, deadline, seq });
    }

    /// Arm `key` to fire `delay` after `now`.
    pub fn schedule_after(&mut self, key: K, now: Instant, delay: Duration) {
        self.schedule(key, now + delay);
    }

    /// Disarm `key`. Returns whether it was armed; cancelling twice is harmless.
    pub fn cancel(&mut self, key: K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.entries.len() != before
    }

    /// Disarm everything. Returns how many timers were pending.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn is_armed(&self, key: K) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn deadline(&self, key: K) -> Option<Instant> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `now`, together with that deadline.
    ///
    /// Call repeatedly until it returns `None`. Timers sharing a deadline come
    /// out in the order they were scheduled.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(K, Instant)> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline <= now)
            .min_by_key(|(_, e)| (e.deadline, e.seq))
            .map(|(i, _)| i)?;
        let entry = self.entries.swap_remove(index);
        Some((entry.key, entry.deadline))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy + Eq + Debug> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Key {
        A,
        B,
        C,
    }

    #[test]
    fn test_schedule_replaces_existing() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule_after(Key::A, t0, Duration::from_millis(100));
        timers.schedule_after(Key::A, t0, Duration::from_millis(500));

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(Key::A), Some(t0 + Duration::from_millis(500)));
        assert_eq!(timers.pop_expired(t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_cancel_idempotent() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(Key::A, t0);
        assert!(timers.cancel(Key::A));
        assert!(!timers.cancel(Key::A));
        assert!(!timers.is_armed(Key::A));
        assert_eq!(timers.pop_expired(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_pop_expired_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(Key::C, t0 + Duration::from_millis(30));
        timers.schedule(Key::A, t0 + Duration::from_millis(10));
        timers.schedule(Key::B, t0 + Duration::from_millis(10));

        let now = t0 + Duration::from_millis(50);
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(10)));
        assert_eq!(timers.pop_expired(now).map(|(k, _)| k), Some(Key::A));
        assert_eq!(timers.pop_expired(now).map(|(k, _)| k), Some(Key::B));
        assert_eq!(timers.pop_expired(now).map(|(k, _)| k), Some(Key::C));
        assert_eq!(timers.pop_expired(now), None);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_not_yet_due_stays_armed() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule_after(Key::A, t0, Duration::from_millis(10));
        timers.schedule_after(Key::B, t0, Duration::from_millis(100));

        let (key, deadline) = timers.pop_expired(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(key, Key::A);
        assert_eq!(deadline, t0 + Duration::from_millis(10));
        assert!(timers.is_armed(Key::B));
    }

    #[test]
    fn test_cancel_all() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(Key::A, t0);
        timers.schedule(Key::B, t0);
        assert_eq!(timers.cancel_all(), 2);
        assert_eq!(timers.cancel_all(), 0);
        assert_eq!(timers.next_deadline(), None);
    }
}
