//! Game configuration and validation.
//!
//! A `GameConfig` fixes the board shape and agent count before any shared
//! resource is created. The agent cap is a validated configuration bound,
//! not a structural constant: collections are sized dynamically and only
//! checked against [`MAX_AGENTS`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of agents in one game.
pub const MAX_AGENTS: usize = 9;

/// Minimum board dimension. Guarantees disjoint starting regions for up to
/// [`MAX_AGENTS`] agents.
pub const MIN_DIMENSION: u16 = 10;

/// Bytes reserved for an agent name in the shared layout (15 + NUL).
pub const NAME_LEN: usize = 16;

/// Default name of the shared state object.
pub const STATE_SHM_NAME: &str = "/champs_state";

/// Default name of the synchronization segment.
pub const SYNC_SHM_NAME: &str = "/champs_sync";

/// Environment variable overriding the state object name.
///
/// The orchestrator passes these to its children so a whole game can run
/// under private names (several games on one host, test isolation).
pub const STATE_SHM_ENV: &str = "CHAMPS_STATE_SHM";

/// Environment variable overriding the synchronization segment name.
pub const SYNC_SHM_ENV: &str = "CHAMPS_SYNC_SHM";

/// Resolve the state object name: environment override or the default.
#[must_use]
pub fn state_shm_name() -> String {
    std::env::var(STATE_SHM_ENV).unwrap_or_else(|_| STATE_SHM_NAME.to_string())
}

/// Resolve the synchronization segment name: environment override or the
/// default.
#[must_use]
pub fn sync_shm_name() -> String {
    std::env::var(SYNC_SHM_ENV).unwrap_or_else(|_| SYNC_SHM_NAME.to_string())
}

/// Configuration rejected by validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("board dimension {0} is below the minimum of {MIN_DIMENSION}")]
    DimensionTooSmall(u16),
    #[error("agent count {0} is outside 1..={MAX_AGENTS}")]
    BadAgentCount(usize),
}

/// Validated board shape and agent count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    width: u16,
    height: u16,
    agent_count: usize,
}

impl GameConfig {
    /// Create a validated configuration.
    ///
    /// Dimensions below [`MIN_DIMENSION`] and agent counts outside
    /// `1..=MAX_AGENTS` are rejected.
    pub fn new(width: u16, height: u16, agent_count: usize) -> Result<Self, ConfigError> {
        if width < MIN_DIMENSION {
            return Err(ConfigError::DimensionTooSmall(width));
        }
        if height < MIN_DIMENSION {
            return Err(ConfigError::DimensionTooSmall(height));
        }
        if agent_count == 0 || agent_count > MAX_AGENTS {
            return Err(ConfigError::BadAgentCount(agent_count));
        }
        Ok(Self {
            width,
            height,
            agent_count,
        })
    }

    /// Board width in cells.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Board height in cells.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Number of agents in the game.
    #[must_use]
    pub const fn agent_count(&self) -> usize {
        self.agent_count
    }

    /// Total number of board cells.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = GameConfig::new(10, 12, 3).unwrap();
        assert_eq!(config.width(), 10);
        assert_eq!(config.height(), 12);
        assert_eq!(config.agent_count(), 3);
        assert_eq!(config.cell_count(), 120);
    }

    #[test]
    fn test_small_dimension_rejected() {
        assert_eq!(
            GameConfig::new(9, 10, 1),
            Err(ConfigError::DimensionTooSmall(9))
        );
        assert_eq!(
            GameConfig::new(10, 4, 1),
            Err(ConfigError::DimensionTooSmall(4))
        );
    }

    #[test]
    fn test_agent_count_bounds() {
        assert_eq!(GameConfig::new(10, 10, 0), Err(ConfigError::BadAgentCount(0)));
        assert_eq!(
            GameConfig::new(10, 10, MAX_AGENTS + 1),
            Err(ConfigError::BadAgentCount(MAX_AGENTS + 1))
        );
        assert!(GameConfig::new(10, 10, MAX_AGENTS).is_ok());
    }
}
