//! Process-shared POSIX semaphore backend.
//!
//! Each semaphore is a `sem_t` living inside the mapped synchronization
//! segment, initialized with `pshared = 1` by the creator and attached in
//! place by every other process. The creator alone destroys them during
//! teardown.

use std::io;
use std::ptr::NonNull;

use crate::ipc::retry_eintr;

use super::semaphore::{Semaphore, SyncError};

/// A `sem_t` at a fixed address inside the shared segment.
///
/// The handle does not own the storage: the segment mapping does. Dropping
/// a `PosixSemaphore` is a no-op; [`PosixSemaphore::destroy`] is called
/// exactly once, by the segment creator, before the mapping goes away.
pub struct PosixSemaphore {
    sem: NonNull<libc::sem_t>,
}

unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl PosixSemaphore {
    /// Initialize a process-shared semaphore in place.
    ///
    /// # Safety
    ///
    /// `sem` must point to suitably aligned, zeroed storage inside a
    /// `MAP_SHARED` region that outlives every attached handle, and must
    /// not already hold an initialized semaphore.
    pub unsafe fn init_at(sem: *mut libc::sem_t, initial: u32) -> Result<Self, SyncError> {
        if libc::sem_init(sem, 1, initial) < 0 {
            return Err(SyncError::primitive("sem_init", io::Error::last_os_error()));
        }
        Ok(Self {
            sem: NonNull::new_unchecked(sem),
        })
    }

    /// Attach to a semaphore another process initialized.
    ///
    /// # Safety
    ///
    /// `sem` must point to a semaphore initialized with `pshared = 1` in a
    /// mapping that outlives this handle.
    #[must_use]
    pub unsafe fn attach(sem: *mut libc::sem_t) -> Self {
        Self {
            sem: NonNull::new_unchecked(sem),
        }
    }

    /// Destroy the underlying semaphore. Creator-only, during teardown,
    /// after every other process has detached.
    pub fn destroy(&self) {
        unsafe {
            libc::sem_destroy(self.sem.as_ptr());
        }
    }
}

impl Semaphore for PosixSemaphore {
    fn wait(&self) -> Result<(), SyncError> {
        retry_eintr(|| {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        })
        .map_err(|err| SyncError::primitive("sem_wait", err))
    }

    fn try_wait(&self) -> Result<bool, SyncError> {
        let taken = retry_eintr(|| {
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EAGAIN) {
                    Ok(false)
                } else {
                    Err(err)
                }
            } else {
                Ok(true)
            }
        })
        .map_err(|err| SyncError::primitive("sem_trywait", err))?;
        Ok(taken)
    }

    fn post(&self) -> Result<(), SyncError> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } < 0 {
            return Err(SyncError::primitive("sem_post", io::Error::last_os_error()));
        }
        Ok(())
    }
}
