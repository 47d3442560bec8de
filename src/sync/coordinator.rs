//! Reader/writer coordination with writer preference.
//!
//! ## The protocol
//!
//! Three gates implement a writer-preferring lock:
//!
//! - the **turnstile**: a writer parks here while waiting, which stops new
//!   readers from entering; readers already inside finish normally.
//! - the **write gate**: held by the single active writer, or by the reader
//!   population as a whole (acquired on the 0→1 reader transition, released
//!   on N→0).
//! - the **count gate**: protects the reader counter itself.
//!
//! The orchestrator is the only writer; agents and the view are readers.
//! A waiting writer is therefore never starved no matter how persistently
//! readers arrive.
//!
//! ## Failure policy
//!
//! Entering returns a [`SyncError`] for the caller to treat as fatal.
//! Guard drops cannot propagate; a failure while exiting means the
//! exclusion invariant is already lost, so the process aborts.

use std::sync::atomic::{AtomicU32, Ordering};

use super::semaphore::{Semaphore, SyncError};

/// Accessor contract for one synchronization segment.
///
/// Both the in-process segment and the shared-memory segment expose the
/// same primitives; the coordinator and everything above it is generic
/// over this trait. Provided methods cover the observer handshake and the
/// per-agent turn gates.
pub trait SyncAccess: Send + Sync {
    type Sem: Semaphore;

    /// Writer-preference gate.
    fn turnstile(&self) -> &Self::Sem;

    /// Write-exclusion gate.
    fn write_gate(&self) -> &Self::Sem;

    /// Gate protecting the reader counter.
    fn count_gate(&self) -> &Self::Sem;

    /// Number of readers currently inside. Only touched under the count
    /// gate; the atomic is for shared-memory placement, not for ordering.
    fn reader_count(&self) -> &AtomicU32;

    /// Observer handshake: posted by the orchestrator after each mutation.
    fn state_changed(&self) -> &Self::Sem;

    /// Observer handshake: posted by the view after each render.
    fn state_rendered(&self) -> &Self::Sem;

    /// Number of turn gates in the segment.
    fn gate_count(&self) -> usize;

    /// The turn gate for one agent.
    fn turn_gate(&self, agent: usize) -> &Self::Sem;

    // === Turn permissions ===

    /// Allow `agent` exactly one move submission.
    fn grant_turn(&self, agent: usize) -> Result<(), SyncError> {
        self.turn_gate(agent).post()
    }

    /// Block until this agent's next turn permission.
    fn wait_turn(&self, agent: usize) -> Result<(), SyncError> {
        self.turn_gate(agent).wait()
    }

    // === Observer handshake ===

    fn notify_changed(&self) -> Result<(), SyncError> {
        self.state_changed().post()
    }

    fn wait_changed(&self) -> Result<(), SyncError> {
        self.state_changed().wait()
    }

    fn ack_rendered(&self) -> Result<(), SyncError> {
        self.state_rendered().post()
    }

    fn wait_rendered(&self) -> Result<(), SyncError> {
        self.state_rendered().wait()
    }

    /// Consume a pending render acknowledgment if one is there. Used
    /// during shutdown instead of [`SyncAccess::wait_rendered`] so an
    /// unresponsive view cannot hang teardown.
    fn try_wait_rendered(&self) -> Result<bool, SyncError> {
        self.state_rendered().try_wait()
    }
}

fn fatal_exit_failure(err: &SyncError) -> ! {
    // Exiting a critical section failed: the exclusion invariant is gone
    // and no further shared access can be trusted.
    tracing::error!(error = %err, "synchronization failure while releasing a lock");
    std::process::abort();
}

/// Shared read access, released on drop.
pub struct ReadGuard<'a, S: SyncAccess> {
    sync: &'a S,
}

/// Exclusive write access, released on drop.
pub struct WriteGuard<'a, S: SyncAccess> {
    sync: &'a S,
}

/// Enter a read section. Any number of readers may be inside together;
/// none while a writer is active, and none may enter while one waits.
pub fn enter_read<S: SyncAccess>(sync: &S) -> Result<ReadGuard<'_, S>, SyncError> {
    sync.turnstile().wait()?;
    sync.count_gate().wait()?;
    let previous = sync.reader_count().fetch_add(1, Ordering::Relaxed);
    if previous == 0 {
        // First reader in holds the write gate for the whole population.
        sync.write_gate().wait()?;
    }
    sync.count_gate().post()?;
    sync.turnstile().post()?;
    Ok(ReadGuard { sync })
}

impl<S: SyncAccess> Drop for ReadGuard<'_, S> {
    fn drop(&mut self) {
        let result = (|| {
            self.sync.count_gate().wait()?;
            let previous = self.sync.reader_count().fetch_sub(1, Ordering::Relaxed);
            if previous == 1 {
                self.sync.write_gate().post()?;
            }
            self.sync.count_gate().post()
        })();
        if let Err(err) = result {
            fatal_exit_failure(&err);
        }
    }
}

/// Enter the write section: excludes every reader and any other writer.
pub fn enter_write<S: SyncAccess>(sync: &S) -> Result<WriteGuard<'_, S>, SyncError> {
    sync.turnstile().wait()?;
    sync.write_gate().wait()?;
    Ok(WriteGuard { sync })
}

impl<S: SyncAccess> Drop for WriteGuard<'_, S> {
    fn drop(&mut self) {
        let result = self
            .sync
            .write_gate()
            .post()
            .and_then(|()| self.sync.turnstile().post());
        if let Err(err) = result {
            fatal_exit_failure(&err);
        }
    }
}
