//! Blocking multi-producer/multi-consumer FIFO

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// FIFO guarded by a mutex, with a condition variable for blocking pops
///
/// A poisoned lock is recovered rather than propagated: the queue holds plain
/// values and has no invariant a panicking holder could break.
pub struct ThreadSafeFifoQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for ThreadSafeFifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadSafeFifoQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one item and wake one waiting consumer
    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.available.notify_one();
    }

    /// Append every item in order and wake all waiting consumers
    pub fn push_range<I: IntoIterator<Item = T>>(&self, items: I) {
        self.lock().extend(items);
        self.available.notify_all();
    }

    /// Pop the front item without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Pop the front item, blocking until one is available
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self
                .available
                .wait(items)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every queued item
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}

#[cfg(test)]
#[path = "thread_safe_queue_tests.rs"]
mod tests;
