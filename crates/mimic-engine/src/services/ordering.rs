//! Response ordering counters.
//!
//! Mocks with several responses serve them in sequence, wrapping around.
//! Each mock gets its own counter; all counters live behind a single lock so
//! the engine can reset them in one step between server runs.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free call counter for one mock.
#[derive(Default)]
struct MockCounter(AtomicU64);

impl MockCounter {
    fn advance(&self, response_count: usize) -> usize {
        let calls = self.0.fetch_add(1, Ordering::Relaxed);
        (calls % response_count as u64) as usize
    }

    fn calls(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MockCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("MockCounter").field(&self.calls()).finish()
    }
}

/// Tracks the position of every mock in its response sequence.
#[derive(Debug, Default)]
pub struct MockOrderingCounters {
    counters: RwLock<HashMap<String, MockCounter>>,
}

impl MockOrderingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the response to serve for this call, advancing the counter.
    pub fn next_index(&self, mock_key: &str, response_count: usize) -> usize {
        if response_count == 0 {
            return 0;
        }

        let mut counters = self.counters.read();
        // Opportunistically use the read lock; insert under the write lock
        // and downgrade if this mock has not been seen yet.
        if !counters.contains_key(mock_key) {
            drop(counters);
            let mut write = self.counters.write();
            write.entry(mock_key.to_string()).or_default();
            counters = RwLockWriteGuard::downgrade(write);
        }
        counters
            .get(mock_key)
            .map_or(0, |counter| counter.advance(response_count))
    }

    /// Calls recorded for a mock since the last reset.
    pub fn calls(&self, mock_key: &str) -> u64 {
        self.counters
            .read()
            .get(mock_key)
            .map_or(0, MockCounter::calls)
    }

    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }

    /// Forget every counter.
    pub fn clear_state(&self) {
        self.counters.write().clear();
    }
}
