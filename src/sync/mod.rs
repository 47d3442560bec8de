//! Synchronization: semaphore backends, the segment, and the
//! reader/writer coordinator.

pub mod coordinator;
pub mod local;
pub mod posix;
pub mod segment;
pub mod semaphore;

pub use coordinator::{enter_read, enter_write, ReadGuard, SyncAccess, WriteGuard};
pub use local::LocalSemaphore;
pub use posix::PosixSemaphore;
pub use segment::{LocalSyncSegment, ShmSyncSegment};
pub use semaphore::{Semaphore, SyncError};
