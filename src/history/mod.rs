//! Bounded, chronological log of fetch outcomes shared by every scheduler task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fetch::FetchOutcome;

/// Outcomes kept by default.
pub const DEFAULT_CAPACITY: usize = 100;

/// FIFO ring of the most recent outcomes.
///
/// Cloning shares the same log. The lock is only held for the in-memory
/// push or copy, never across an await point.
#[derive(Clone)]
pub struct HistoryLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<FetchOutcome>>>,
}

impl HistoryLog {
    /// A log keeping at most `capacity` outcomes (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Append an outcome, evicting the oldest one when full.
    pub fn record(&self, outcome: FetchOutcome) {
        let mut entries = self.lock();
        entries.push_back(outcome);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Oldest-first copy of every outcome recorded so far.
    pub fn snapshot(&self) -> Vec<FetchOutcome> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Every critical section leaves the deque consistent, so a poisoned
    // lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<FetchOutcome>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
