//! OS plumbing: shared-memory objects, move channels, child processes.

pub mod channel;
pub mod process;
pub mod shm;

pub use channel::{move_channel, MoveReceiver, MoveSender, ProtocolError, ReadOutcome};
pub use process::ProcessSet;
pub use shm::{ResourceError, ShmRegion};

use std::io;

/// Run an OS operation, transparently retrying on transient interruption.
///
/// Every wait/read/write site in the crate goes through this one helper;
/// EINTR is never surfaced to callers.
pub(crate) fn retry_eintr<T, F>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match op() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_eintr_retries_then_succeeds() {
        let mut attempts = 0;
        let result: io::Result<u32> = retry_eintr(|| {
            attempts += 1;
            if attempts < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retry_eintr_passes_through_other_errors() {
        let result: io::Result<()> =
            retry_eintr(|| Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }
}
