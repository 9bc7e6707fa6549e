use std::collections::VecDeque;
use std::time::Duration;

use educe::Educe;
use serde::{Deserialize, Serialize};

/// Monotonic time since the host scheduler started, supplied by the host on every call
pub type Time = Duration;

/// Time-ordered expiry list owned by a single information base.
///
/// Most deadlines are near-future, so insertion scans from the tail.
#[derive(Clone, Debug, Serialize, Deserialize, Educe)]
#[educe(Default(bound()))]
pub struct TimeoutList<K> {
    entries: VecDeque<(Time, K)>,
}

impl<K: Copy + PartialEq> TimeoutList<K> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts after every entry due at or before `at`
    pub fn schedule(&mut self, key: K, at: Time) {
        let pos = self
            .entries
            .iter()
            .rposition(|(t, _)| *t <= at)
            .map_or(0, |p| p + 1);
        self.entries.insert(pos, (at, key));
    }

    pub fn reschedule(&mut self, key: K, at: Time) {
        self.cancel(key);
        self.schedule(key, at);
    }

    /// returns: whether the key had a pending entry
    pub fn cancel(&mut self, key: K) -> bool {
        if let Some(pos) = self.entries.iter().position(|(_, k)| *k == key) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn deadline(&self, key: K) -> Option<Time> {
        self.entries
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(t, _)| *t)
    }

    pub fn next_deadline(&self) -> Option<Time> {
        self.entries.front().map(|(t, _)| *t)
    }

    /// Unlinks the earliest entry if it is due
    pub fn pop_expired(&mut self, now: Time) -> Option<(Time, K)> {
        match self.entries.front() {
            Some((t, _)) if *t <= now => self.entries.pop_front(),
            _ => None,
        }
    }

    pub fn drain_expired(&mut self, now: Time) -> Vec<K> {
        let mut expired = Vec::new();
        while let Some((_, key)) = self.pop_expired(now) {
            expired.push(key);
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Time, K)> {
        self.entries.iter()
    }
}
