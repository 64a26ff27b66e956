//! Expiration Queue Module
//!
//! Min-heap of expiration schedules consumed by the periodic sweep.
//!
//! Schedules are never removed eagerly. Each carries the generation of the
//! entry it was armed for; the store ignores any popped schedule whose
//! generation no longer matches the live entry, which makes delete, clear
//! and TTL updates cancel outstanding schedules deterministically.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Minimum heap size before stale schedules are worth compacting away.
const COMPACT_MIN_LEN: usize = 64;

// == Schedule ==
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Schedule {
    pub expires_at: u64,
    pub generation: u64,
    pub key: String,
}

// == Expiry Queue ==
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<Schedule>>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms an expiration for `key` at `expires_at`.
    pub fn schedule(&mut self, key: &str, expires_at: u64, generation: u64) {
        self.heap.push(Reverse(Schedule {
            expires_at,
            generation,
            key: key.to_string(),
        }));
    }

    /// Pops the earliest schedule if it is due (`expires_at < now`).
    pub fn pop_due(&mut self, now: u64) -> Option<Schedule> {
        match self.heap.peek() {
            Some(Reverse(next)) if next.expires_at < now => self.heap.pop().map(|r| r.0),
            _ => None,
        }
    }

    /// Earliest pending expiration time, stale or not.
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(s)| s.expires_at)
    }

    /// Whether stale schedules outnumber live ones enough to rebuild.
    pub fn needs_compaction(&self, live_schedules: usize) -> bool {
        self.heap.len() > COMPACT_MIN_LEN && self.heap.len() > live_schedules * 2
    }

    /// Keeps only the schedules `is_live` accepts.
    pub fn retain<F>(&mut self, mut is_live: F)
    where
        F: FnMut(&Schedule) -> bool,
    {
        self.heap.retain(|Reverse(s)| is_live(s));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
