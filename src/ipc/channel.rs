//! The move channel: one unidirectional pipe per agent.
//!
//! Wire format is a single byte per request, no framing. The orchestrator
//! owns the read end; the agent's write end becomes its stdout. A zero-byte
//! read is an orderly end-of-input (the agent closed its end); anything
//! else that is not EINTR is a hard channel error.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use thiserror::Error;

use super::retry_eintr;
use crate::core::Direction;

/// A persistent (non-EINTR) channel failure.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("could not create move channel: {0}")]
    Create(#[source] io::Error),
    #[error("move read failed: {0}")]
    Read(#[source] io::Error),
    #[error("move write failed: {0}")]
    Write(#[source] io::Error),
}

/// What a single read produced.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One raw wire byte. May still be an out-of-range direction; the
    /// scheduler validates it.
    Byte(u8),
    /// The agent closed its end.
    Eof,
}

/// Orchestrator-held read end of one agent's channel.
pub struct MoveReceiver {
    fd: OwnedFd,
}

/// Agent-held write end.
pub struct MoveSender {
    fd: OwnedFd,
}

/// Create a channel pair. Both ends are close-on-exec so a spawned child
/// only ever inherits the single descriptor wired into its stdio.
pub fn move_channel() -> Result<(MoveReceiver, MoveSender), ProtocolError> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(ProtocolError::Create(io::Error::last_os_error()));
    }
    let (read_fd, write_fd) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((MoveReceiver { fd: read_fd }, MoveSender { fd: write_fd }))
}

impl MoveReceiver {
    /// Read the next request. Retries EINTR, maps a closed end to
    /// [`ReadOutcome::Eof`].
    pub fn read_move(&mut self) -> Result<ReadOutcome, ProtocolError> {
        let mut byte = 0u8;
        let n = retry_eintr(|| {
            let ret = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    std::ptr::addr_of_mut!(byte).cast(),
                    1,
                )
            };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        })
        .map_err(ProtocolError::Read)?;

        if n == 0 {
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Byte(byte))
        }
    }
}

impl AsFd for MoveReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for MoveReceiver {
    fn as_raw_fd(&self) -> i32 {
        self.fd.as_raw_fd()
    }
}

impl MoveSender {
    /// Send one direction.
    pub fn send(&mut self, dir: Direction) -> Result<(), ProtocolError> {
        self.send_raw(dir.as_byte())
    }

    /// Send an arbitrary wire byte. The orchestrator counts out-of-range
    /// values as invalid moves, which harnesses exercise deliberately.
    pub fn send_raw(&mut self, byte: u8) -> Result<(), ProtocolError> {
        let n = retry_eintr(|| {
            let ret = unsafe {
                libc::write(self.fd.as_raw_fd(), std::ptr::addr_of!(byte).cast(), 1)
            };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        })
        .map_err(ProtocolError::Write)?;

        if n != 1 {
            return Err(ProtocolError::Write(io::Error::from(
                io::ErrorKind::WriteZero,
            )));
        }
        Ok(())
    }

    /// Hand the write end over, e.g. to wire it into a child's stdout.
    #[must_use]
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }

    /// Adopt the current process's stdout as the move channel.
    ///
    /// # Safety
    ///
    /// Takes ownership of descriptor 1: nothing else in the process may
    /// write to or close stdout afterwards. Dropping the sender closes it,
    /// which is how an agent signals an orderly end-of-input.
    #[must_use]
    pub unsafe fn from_raw_stdout() -> MoveSender {
        MoveSender {
            fd: OwnedFd::from_raw_fd(libc::STDOUT_FILENO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive_direction() {
        let (mut rx, mut tx) = move_channel().unwrap();
        tx.send(Direction::SouthWest).unwrap();
        assert_eq!(rx.read_move().unwrap(), ReadOutcome::Byte(5));
    }

    #[test]
    fn test_closed_sender_reads_as_eof() {
        let (mut rx, tx) = move_channel().unwrap();
        drop(tx);
        assert_eq!(rx.read_move().unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_raw_bytes_pass_through_unvalidated() {
        let (mut rx, mut tx) = move_channel().unwrap();
        tx.send_raw(200).unwrap();
        assert_eq!(rx.read_move().unwrap(), ReadOutcome::Byte(200));
    }
}
