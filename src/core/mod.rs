//! Core types: directions, configuration, the shared-state layout and its
//! typed handles, board setup, deterministic RNG.
//!
//! Everything here is process-agnostic: the same accessors run over a
//! shared-memory mapping in the real game and over a heap buffer in
//! threaded harnesses.

pub mod board;
pub mod config;
pub mod direction;
pub mod layout;
pub mod rng;
pub mod state;

pub use config::{ConfigError, GameConfig, MAX_AGENTS, MIN_DIMENSION, NAME_LEN};
pub use direction::Direction;
pub use layout::StateLayout;
pub use rng::GameRng;
pub use state::{AgentRecord, GameSnapshot, ReadOnly, ReadWrite, StateReader, StateWriter};
