//! The round-robin turn scheduler.
//!
//! ## State machine
//!
//! Per agent: `Active` → `TurnGranted` (exactly one outstanding
//! permission) → `Active`, or → `Blocked` (terminal: no legal move from
//! the current cell, or the channel reached end-of-input/failed). Global:
//! running → finished, on inactivity timeout, on every agent blocked, or
//! on an external stop request.
//!
//! ## One iteration
//!
//! Compute the time left until the inactivity timeout (which only valid
//! moves reset), `poll` the open channels for that long, then service the
//! first ready channel scanning forward from the round-robin cursor —
//! among simultaneously-ready agents that is exactly least-recently-
//! serviced order, so no ready agent is serviced twice before another is
//! serviced once. The move is validated and applied under the writer
//! lock, the view notified, the turn re-granted unless the agent is now
//! blocked, and the cursor advances past the serviced agent.
//!
//! ## Finishing
//!
//! The finished flag is set under the writer lock, the view notified one
//! last time, and every agent granted a final permission so it can
//! observe `finished` and exit. The channels are then drained for a
//! bounded grace period: leftover bytes are read and discarded so no
//! agent ever blocks on a full pipe while shutting down.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::MAX_AGENTS;
use crate::core::{Direction, StateWriter};
use crate::ipc::{MoveReceiver, ReadOutcome};
use crate::sync::{enter_read, enter_write, SyncAccess, SyncError};

use super::notify::ViewNotifier;

/// Orchestrator-fatal engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("channel multiplexing failed: {0}")]
    Poll(#[source] io::Error),
}

/// Timing knobs for one run.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Stop when no valid move lands for this long.
    pub inactivity_timeout: Duration,
    /// How long the shutdown drain keeps reading leftover bytes.
    pub drain_grace: Duration,
    /// Fixed pacing delay after each notification.
    pub tick_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(10),
            drain_grace: Duration::from_secs(2),
            tick_delay: Duration::from_millis(200),
        }
    }
}

/// Why the run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FinishReason {
    /// No agent had a legal move left.
    AllBlocked,
    /// No valid move landed within the inactivity timeout.
    InactivityTimeout,
    /// An external stop was requested.
    Stopped,
}

/// Per-agent scheduler phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AgentPhase {
    Active,
    TurnGranted,
    Blocked,
}

/// Outcome of validating one request byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MoveOutcome {
    Valid { reward: u32 },
    Invalid,
}

/// What one finished run looked like.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub reason: FinishReason,
    pub valid_moves: u32,
    pub invalid_moves: u32,
    /// Agent index per service event, in order. Diagnostic: lets harnesses
    /// check round-robin fairness.
    pub service_trace: Vec<u8>,
}

enum PollOutcome {
    Ready(SmallVec<[usize; MAX_AGENTS]>),
    TimedOut,
    Interrupted,
}

/// Wait for readiness on the given `(agent, fd)` pairs.
///
/// EINTR is surfaced as [`PollOutcome::Interrupted`] instead of being
/// retried in place: the caller recomputes the remaining timeout first.
fn poll_channels(
    entries: &[(usize, i32)],
    timeout: Duration,
) -> Result<PollOutcome, EngineError> {
    let mut fds: Vec<libc::pollfd> = entries
        .iter()
        .map(|&(_, fd)| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(PollOutcome::Interrupted);
        }
        return Err(EngineError::Poll(err));
    }
    if ret == 0 {
        return Ok(PollOutcome::TimedOut);
    }

    let ready = entries
        .iter()
        .zip(&fds)
        .filter(|(_, pollfd)| {
            pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
        })
        .map(|(&(agent, _), _)| agent)
        .collect();
    Ok(PollOutcome::Ready(ready))
}

/// The orchestrator's turn dispatcher. Single-threaded; all waiting is
/// readiness-based multiplexing over the agent channels.
pub struct Scheduler<'a, S: SyncAccess> {
    state: &'a StateWriter,
    sync: &'a S,
    channels: Vec<Option<MoveReceiver>>,
    config: SchedulerConfig,
    stop: Arc<AtomicBool>,
    has_view: bool,
    phases: SmallVec<[AgentPhase; MAX_AGENTS]>,
    cursor: usize,
    last_valid: Instant,
    valid_moves: u32,
    invalid_moves: u32,
    service_trace: Vec<u8>,
}

impl<'a, S: SyncAccess> Scheduler<'a, S> {
    /// Build a scheduler over one channel per agent, in index order.
    pub fn new(
        state: &'a StateWriter,
        sync: &'a S,
        channels: Vec<MoveReceiver>,
        config: SchedulerConfig,
        has_view: bool,
        stop: Arc<AtomicBool>,
    ) -> Self {
        assert_eq!(channels.len(), state.agent_count());
        let phases = channels.iter().map(|_| AgentPhase::Active).collect();
        Self {
            state,
            sync,
            channels: channels.into_iter().map(Some).collect(),
            config,
            stop,
            has_view,
            phases,
            cursor: 0,
            last_valid: Instant::now(),
            valid_moves: 0,
            invalid_moves: 0,
            service_trace: Vec::new(),
        }
    }

    /// Run the game to completion, including the shutdown drain. Returns
    /// how the run ended; scores live in the shared state.
    pub fn run(mut self) -> Result<RunSummary, EngineError> {
        let agent_count = self.state.agent_count();

        // Initial render, initial blocked scan, one permission each.
        self.notify()?;
        {
            let _write = enter_write(self.sync)?;
            self.state.mark_blocked_agents();
        }
        for agent in 0..agent_count {
            let blocked = {
                let _read = enter_read(self.sync)?;
                self.state.agent_blocked(agent)
            };
            if blocked {
                self.phases[agent] = AgentPhase::Blocked;
            } else {
                self.sync.grant_turn(agent)?;
                self.phases[agent] = AgentPhase::TurnGranted;
            }
        }
        self.last_valid = Instant::now();

        let reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break FinishReason::Stopped;
            }

            let elapsed = self.last_valid.elapsed();
            let Some(remaining) = self.config.inactivity_timeout.checked_sub(elapsed) else {
                break FinishReason::InactivityTimeout;
            };
            if remaining.is_zero() {
                break FinishReason::InactivityTimeout;
            }

            let open: Vec<(usize, i32)> = self
                .channels
                .iter()
                .enumerate()
                .filter_map(|(i, ch)| ch.as_ref().map(|ch| (i, ch.as_raw_fd())))
                .collect();
            if open.is_empty() {
                break FinishReason::AllBlocked;
            }

            let ready = match poll_channels(&open, remaining)? {
                PollOutcome::Interrupted => continue,
                PollOutcome::TimedOut => break FinishReason::InactivityTimeout,
                PollOutcome::Ready(ready) => ready,
            };

            // One agent per iteration: the first ready one at or after the
            // cursor, i.e. the least recently serviced among the ready.
            let Some(serviced) = (0..agent_count)
                .map(|off| (self.cursor + off) % agent_count)
                .find(|i| self.channels[*i].is_some() && ready.contains(i))
            else {
                continue;
            };

            self.service(serviced)?;
            self.cursor = (serviced + 1) % agent_count;

            let can_move = {
                let _read = enter_read(self.sync)?;
                self.state.any_agent_can_move()
            };
            if !can_move {
                break FinishReason::AllBlocked;
            }
        };

        info!(?reason, "game over");
        self.finish(reason)
    }

    /// Handle one ready channel: read, validate, apply, notify, re-grant.
    fn service(&mut self, agent: usize) -> Result<(), EngineError> {
        let Some(channel) = self.channels[agent].as_mut() else {
            return Ok(());
        };
        self.service_trace.push(agent as u8);

        match channel.read_move() {
            Ok(ReadOutcome::Byte(byte)) => {
                self.phases[agent] = AgentPhase::Active;
                match self.apply_move(agent, byte)? {
                    MoveOutcome::Valid { reward } => {
                        self.valid_moves += 1;
                        self.last_valid = Instant::now();
                        debug!(agent, byte, reward, "valid move");
                    }
                    MoveOutcome::Invalid => {
                        self.invalid_moves += 1;
                        debug!(agent, byte, "invalid move");
                    }
                }
            }
            Ok(ReadOutcome::Eof) => {
                info!(agent, "channel closed by agent");
                self.block_agent(agent)?;
            }
            Err(err) => {
                warn!(agent, error = %err, "channel error; closing");
                self.block_agent(agent)?;
            }
        }

        // A move can wall somebody in; refresh every blocked flag.
        {
            let _write = enter_write(self.sync)?;
            self.state.mark_blocked_agents();
        }
        let serviced_blocked = {
            let _read = enter_read(self.sync)?;
            for i in 0..self.phases.len() {
                if self.phases[i] != AgentPhase::Blocked && self.state.agent_blocked(i) {
                    self.phases[i] = AgentPhase::Blocked;
                }
            }
            self.state.agent_blocked(agent)
        };

        self.notify()?;

        if self.channels[agent].is_some() && !serviced_blocked {
            self.sync.grant_turn(agent)?;
            self.phases[agent] = AgentPhase::TurnGranted;
        }
        Ok(())
    }

    /// Mark an agent blocked after EOF or a hard channel error and retire
    /// its channel.
    fn block_agent(&mut self, agent: usize) -> Result<(), SyncError> {
        {
            let _write = enter_write(self.sync)?;
            self.state.set_blocked(agent);
        }
        self.channels[agent] = None;
        self.phases[agent] = AgentPhase::Blocked;
        Ok(())
    }

    /// Validate one request byte and apply it, all under the writer lock.
    fn apply_move(&self, agent: usize, byte: u8) -> Result<MoveOutcome, SyncError> {
        let _write = enter_write(self.sync)?;

        let Some(dir) = Direction::from_byte(byte) else {
            self.state.record_invalid_move(agent);
            return Ok(MoveOutcome::Invalid);
        };
        if self.state.agent_blocked(agent) {
            self.state.record_invalid_move(agent);
            return Ok(MoveOutcome::Invalid);
        }

        let (x, y) = self.state.agent_position(agent);
        let (nx, ny) = dir.step_from(x, y);
        if !self.state.cell_is_free(nx, ny) {
            self.state.record_invalid_move(agent);
            return Ok(MoveOutcome::Invalid);
        }

        let reward = self.state.cell(nx as u16, ny as u16) as u32;
        self.state.record_valid_move(agent, nx as u16, ny as u16, reward);
        Ok(MoveOutcome::Valid { reward })
    }

    fn notify(&self) -> Result<(), SyncError> {
        ViewNotifier::new(
            self.sync,
            self.has_view,
            self.config.tick_delay,
            &self.stop,
        )
        .notify()
    }

    /// Terminal sequence: finished flag, last notification, one final
    /// permission per agent, then the drain.
    fn finish(mut self, reason: FinishReason) -> Result<RunSummary, EngineError> {
        {
            let _write = enter_write(self.sync)?;
            self.state.set_finished(true);
        }
        self.notify()?;

        for agent in 0..self.state.agent_count() {
            self.sync.grant_turn(agent)?;
        }

        self.drain()?;

        Ok(RunSummary {
            reason,
            valid_moves: self.valid_moves,
            invalid_moves: self.invalid_moves,
            service_trace: self.service_trace,
        })
    }

    /// Read and discard leftover bytes until every channel reaches EOF or
    /// the grace period runs out. Read ends stay open the whole time so no
    /// exiting agent is killed by a pipe signal.
    fn drain(&mut self) -> Result<(), EngineError> {
        let deadline = Instant::now() + self.config.drain_grace;

        loop {
            let open: Vec<(usize, i32)> = self
                .channels
                .iter()
                .enumerate()
                .filter_map(|(i, ch)| ch.as_ref().map(|ch| (i, ch.as_raw_fd())))
                .collect();
            if open.is_empty() {
                return Ok(());
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    debug!("drain grace elapsed with channels still open");
                    return Ok(());
                }
            };

            let slice = remaining.min(Duration::from_millis(100));
            let ready = match poll_channels(&open, slice)? {
                PollOutcome::Interrupted | PollOutcome::TimedOut => continue,
                PollOutcome::Ready(ready) => ready,
            };

            for agent in ready {
                let Some(channel) = self.channels[agent].as_mut() else {
                    continue;
                };
                match channel.read_move() {
                    Ok(ReadOutcome::Byte(_)) => {
                        // A request that raced the finished flag; discard.
                    }
                    Ok(ReadOutcome::Eof) => {
                        self.block_agent(agent)?;
                    }
                    Err(err) => {
                        warn!(agent, error = %err, "channel error during drain");
                        self.channels[agent] = None;
                    }
                }
            }
        }
    }
}
