use std::sync::{Condvar, Mutex};

/// Counting semaphore built on a mutex and a condition variable.
///
/// The pool uses one per result handle to synchronize the single-shot
/// hand-off between the worker publishing a value and the consumer
/// waiting for it.
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with the given initial count
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Block until the count is positive, then take one unit
    pub fn acquire(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.available.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Add one unit and wake every waiter.
    ///
    /// Waking all of them rather than one lets waiters re-check their own
    /// predicates during teardown.
    pub fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.available.notify_all();
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
