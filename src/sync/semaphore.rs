//! The counting-semaphore contract both backends satisfy.
//!
//! Everything above this layer — the reader/writer coordinator, the turn
//! gates, the observer handshake — is written against [`Semaphore`] alone,
//! so the threaded backend and the process-shared backend are
//! interchangeable.

use std::io;

use thiserror::Error;

/// A synchronization primitive failed for a non-transient reason.
///
/// EINTR never reaches this type; it is retried away below. Anything that
/// does surface here means the exclusion invariants can no longer be
/// trusted, and the orchestrator treats it as fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("semaphore {op} failed: {source}")]
    Primitive {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("synchronization segment rejected: {0}")]
    BadSegment(String),
}

impl SyncError {
    pub(crate) fn primitive(op: &'static str, source: io::Error) -> Self {
        SyncError::Primitive { op, source }
    }
}

/// A counting semaphore shared between the orchestrator, agents, and view.
pub trait Semaphore: Send + Sync {
    /// Block until the count is positive, then decrement it.
    fn wait(&self) -> Result<(), SyncError>;

    /// Decrement without blocking. Returns whether a unit was taken.
    fn try_wait(&self) -> Result<bool, SyncError>;

    /// Increment the count, waking one waiter.
    fn post(&self) -> Result<(), SyncError>;
}
