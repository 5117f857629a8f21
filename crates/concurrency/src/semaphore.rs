//! Bounded-concurrency gate for upstream annotate acquisition (C5).
//!
//! The original service bounds outstanding annotate requests at
//! `MAX_CONCURRENT_ANN_REQUESTS` and has callers block up to `ANN_WAIT_TIME`
//! for a slot. `parking_lot::Condvar::wait_for` gives the same bounded wait
//! without pulling in a dedicated semaphore crate.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A counting semaphore with a bounded wait.
pub struct AnnotateSemaphore {
    state: Mutex<usize>,
    available: Condvar,
    capacity: usize,
}

impl AnnotateSemaphore {
    /// Create a semaphore admitting up to `capacity` concurrent holders.
    pub fn new(capacity: usize) -> Self {
        AnnotateSemaphore {
            state: Mutex::new(capacity),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Block up to `timeout` for a free slot. Returns `None` on timeout; the
    /// returned [`AnnotatePermit`] releases the slot when dropped.
    pub fn acquire(&self, timeout: Duration) -> Option<AnnotatePermit<'_>> {
        let mut remaining = self.state.lock();
        if *remaining == 0 {
            let result = self.available.wait_for(&mut remaining, timeout);
            if result.timed_out() && *remaining == 0 {
                return None;
            }
        }
        *remaining -= 1;
        Some(AnnotatePermit { semaphore: self })
    }

    /// Slots currently free, for metrics and tests.
    pub fn available_permits(&self) -> usize {
        *self.state.lock()
    }

    /// Total capacity this semaphore was built with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// RAII guard releasing a held annotate slot on drop.
pub struct AnnotatePermit<'a> {
    semaphore: &'a AnnotateSemaphore,
}

impl<'a> Drop for AnnotatePermit<'a> {
    fn drop(&mut self) {
        let mut remaining = self.semaphore.state.lock();
        *remaining += 1;
        self.semaphore.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_releases_slot_on_drop() {
        let sem = AnnotateSemaphore::new(1);
        {
            let _permit = sem.acquire(Duration::from_secs(1)).unwrap();
            assert_eq!(sem.available_permits(), 0);
        }
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn acquire_times_out_when_exhausted() {
        let sem = Arc::new(AnnotateSemaphore::new(1));
        let _held = sem.acquire(Duration::from_secs(1)).unwrap();
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || sem2.acquire(Duration::from_millis(50)));
        assert!(handle.join().unwrap().is_none());
    }
}
