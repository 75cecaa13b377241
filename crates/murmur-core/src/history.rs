//! Bounded history of committed generations.

use std::collections::VecDeque;

use crate::domain::Generation;

/// Default number of generations retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 12;

/// FIFO-evicting store of committed generations, read most-recent-first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Generation>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a generation, returning the oldest entry if it was evicted.
    pub fn commit(&mut self, generation: Generation) -> Option<Generation> {
        self.entries.push_back(generation);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Entries, most recent first.
    pub fn view(&self) -> impl ExactSizeIterator<Item = &Generation> + '_ {
        self.entries.iter().rev()
    }

    /// Owned copy of [`view`](Self::view).
    pub fn snapshot(&self) -> Vec<Generation> {
        self.view().cloned().collect()
    }
}
