//! # chompchamps
//!
//! A multi-agent grid-conquest game: independent agent processes compete
//! for reward cells on a shared board, coordinated by a single-threaded
//! orchestrator and optionally observed by a live terminal view.
//!
//! ## Design Principles
//!
//! 1. **Handles, not globals**: every shared resource is an explicit
//!    handle tagged read-only or read-write at the type level. The
//!    orchestrator owns creation and destruction; everyone else attaches.
//!
//! 2. **One mutation discipline**: all state changes happen under the
//!    writer-preferring reader/writer coordinator, so no process ever
//!    observes a torn update.
//!
//! 3. **Backend-agnostic synchronization**: the coordinator, scheduler,
//!    agent runtime, and view are generic over the synchronization
//!    segment, so the multi-process shared-memory deployment and the
//!    threaded test harness run the same code.
//!
//! ## Architecture
//!
//! - One orchestrator process owns the shared state and the scheduler; it
//!   multiplexes over one byte-channel per agent with `poll(2)` and never
//!   spawns threads.
//! - Each agent is an independent process granted one turn permission at
//!   a time: read a snapshot, pick a move, write one byte.
//! - The optional view renders on a two-phase changed/rendered handshake.
//!
//! ## Modules
//!
//! - `core`: directions, configuration, state layout and handles, board
//!   setup, deterministic RNG
//! - `sync`: semaphore backends, the synchronization segment, the
//!   reader/writer coordinator
//! - `ipc`: shared-memory objects, move channels, child processes
//! - `engine`: turn scheduler, observer notification, lifecycle, report
//! - `agent`: agent runtime and move strategies
//! - `view`: terminal renderer

pub mod agent;
pub mod core;
pub mod engine;
pub mod ipc;
pub mod sync;
pub mod view;

// Re-export commonly used types
pub use crate::core::{
    AgentRecord, Direction, GameConfig, GameRng, GameSnapshot, StateReader, StateWriter,
    MAX_AGENTS,
};

pub use crate::sync::{
    enter_read, enter_write, LocalSyncSegment, Semaphore, ShmSyncSegment, SyncAccess, SyncError,
};

pub use crate::ipc::{
    move_channel, MoveReceiver, MoveSender, ProtocolError, ReadOutcome, ResourceError,
};

pub use crate::engine::{
    run_game, FinishReason, GameReport, OrchestratorError, RunOptions, RunSummary, Scheduler,
    SchedulerConfig,
};

pub use crate::agent::{AutoStrategy, GreedyPlus, Strategy};
