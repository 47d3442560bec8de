//! The agent runtime: attach, find yourself, play until finished.
//!
//! An agent never trusts its argv: the authoritative board and its own
//! index come from the shared state, located by the well-known names. The
//! index is found by pid — the orchestrator publishes it under the writer
//! lock right after the spawn, so discovery retries briefly.

pub mod strategy;

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::core::StateReader;
use crate::ipc::shm::ResourceError;
use crate::ipc::{MoveSender, ProtocolError};
use crate::sync::{enter_read, SyncAccess, SyncError};

pub use strategy::{AutoStrategy, EndgameHarvest, GreedyPlus, SpaceMax, Strategy};

/// Discovery retry schedule: the pid shows up within a lock round-trip.
const DISCOVER_ATTEMPTS: u32 = 100;
const DISCOVER_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Channel(#[from] ProtocolError),
    #[error("pid {0} is not registered in the shared state")]
    NotRegistered(i32),
}

/// Find this process's agent index by scanning the records for `pid`.
pub fn discover_index<S: SyncAccess>(
    state: &StateReader,
    sync: &S,
    pid: i32,
) -> Result<usize, AgentError> {
    for attempt in 0..DISCOVER_ATTEMPTS {
        {
            let _read = enter_read(sync)?;
            for index in 0..state.agent_count() {
                if state.agent_pid(index) == pid {
                    debug!(index, attempt, "agent index discovered");
                    return Ok(index);
                }
            }
        }
        std::thread::sleep(DISCOVER_BACKOFF);
    }
    Err(AgentError::NotRegistered(pid))
}

/// The agent main loop.
///
/// Wait for a turn permission, snapshot the board under the reader lock,
/// ask the strategy, send the byte. A `None` from the strategy closes the
/// channel (the orchestrator reads that as an explicit block) and the
/// loop ends when `finished` is observed.
pub fn run<S: SyncAccess>(
    state: &StateReader,
    sync: &S,
    index: usize,
    mut channel: MoveSender,
    strategy: &mut dyn Strategy,
) -> Result<(), AgentError> {
    loop {
        let finished = {
            let _read = enter_read(sync)?;
            state.finished()
        };
        if finished {
            break;
        }

        sync.wait_turn(index)?;

        let snapshot = {
            let _read = enter_read(sync)?;
            state.snapshot()
        };
        if snapshot.finished {
            // This was the final wake-up grant.
            break;
        }

        let Some(dir) = strategy.pick_move(&snapshot, index) else {
            debug!(index, "no move; closing channel");
            break;
        };
        if let Err(err) = channel.send(dir) {
            // The orchestrator went away or closed our channel; exit the
            // normal way rather than surfacing an error.
            debug!(index, error = %err, "channel write failed; exiting");
            break;
        }
    }

    drop(channel);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{board, GameConfig, StateWriter};
    use crate::ipc::move_channel;
    use crate::sync::{enter_write, LocalSyncSegment};

    #[test]
    fn test_discover_index_finds_published_pid() {
        let config = GameConfig::new(10, 10, 2).unwrap();
        let state = StateWriter::create_in_memory(&config);
        let sync = LocalSyncSegment::new(2);

        {
            let _write = enter_write(&sync).unwrap();
            state.set_agent_identity(0, "a", 1111);
            state.set_agent_identity(1, "b", 2222);
        }

        let reader = state.reader().unwrap();
        assert_eq!(discover_index(&reader, &sync, 2222).unwrap(), 1);
    }

    #[test]
    fn test_run_exits_on_finished() {
        let config = GameConfig::new(10, 10, 1).unwrap();
        let state = StateWriter::create_in_memory(&config);
        let sync = LocalSyncSegment::new(1);
        board::initialize(&state, &config, 5);
        state.set_finished(true);

        let (_rx, tx) = move_channel().unwrap();
        let reader = state.reader().unwrap();
        let mut strategy = GreedyPlus::new();
        run(&reader, &sync, 0, tx, &mut strategy).unwrap();
    }
}
