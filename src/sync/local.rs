//! In-process semaphore backend.
//!
//! A mutex + condvar counting semaphore. Used by threaded harnesses and
//! tests, where agents are threads instead of processes; the coordinator
//! logic on top is identical to the shared-memory deployment.

use parking_lot::{Condvar, Mutex};

use super::semaphore::{Semaphore, SyncError};

/// Counting semaphore for threads in one process. These operations cannot
/// fail; the `Result` is the shared contract's.
pub struct LocalSemaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl LocalSemaphore {
    /// Create a semaphore with the given initial count.
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }
}

impl Semaphore for LocalSemaphore {
    fn wait(&self) -> Result<(), SyncError> {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
        Ok(())
    }

    fn try_wait(&self) -> Result<bool, SyncError> {
        let mut count = self.count.lock();
        if *count == 0 {
            return Ok(false);
        }
        *count -= 1;
        Ok(true)
    }

    fn post(&self) -> Result<(), SyncError> {
        let mut count = self.count.lock();
        *count += 1;
        self.available.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_counts_down_and_up() {
        let sem = LocalSemaphore::new(2);
        assert!(sem.try_wait().unwrap());
        assert!(sem.try_wait().unwrap());
        assert!(!sem.try_wait().unwrap());

        sem.post().unwrap();
        assert!(sem.try_wait().unwrap());
    }

    #[test]
    fn test_wait_blocks_until_post() {
        let sem = Arc::new(LocalSemaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            std::thread::spawn(move || sem.wait())
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        sem.post().unwrap();
        waiter.join().unwrap().unwrap();
    }
}
