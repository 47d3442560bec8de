//! Board setup: reward generation and starting placement.
//!
//! Rewards are drawn uniformly from 1-9 out of a deterministic stream, so a
//! seed plus dimensions fully determines the grid. Starting cells come from
//! a region partition: agents are spread over an r×c grid of regions and
//! each lands on its region's center, which keeps starts disjoint for any
//! valid configuration.

use smallvec::SmallVec;

use super::config::{GameConfig, MAX_AGENTS};
use super::rng::GameRng;
use super::state::StateWriter;

/// Fill every cell with a reward and place all agents on their starting
/// cells. Runs before any child process exists, so no locking is involved.
pub fn initialize(state: &StateWriter, config: &GameConfig, seed: u64) {
    let mut rng = GameRng::new(seed);
    for y in 0..config.height() {
        for x in 0..config.width() {
            state.set_cell(x, y, rng.gen_range(1..10));
        }
    }

    for (index, (x, y)) in starting_positions(config).into_iter().enumerate() {
        state.place_agent(index, x, y);
    }
}

/// Starting cell per agent: the center of its cell in an r×c region grid,
/// where r is the largest integer with r² ≤ N and c = ⌈N/r⌉.
#[must_use]
pub fn starting_positions(config: &GameConfig) -> SmallVec<[(u16, u16); MAX_AGENTS]> {
    let n = config.agent_count();
    let rows = (1..=n).take_while(|r| r * r <= n).last().unwrap_or(1);
    let cols = n.div_ceil(rows);

    let width = config.width() as usize;
    let height = config.height() as usize;

    (0..n)
        .map(|k| {
            let row = k / cols;
            let col = k % cols;
            let x = ((2 * col + 1) * width / (2 * cols)).min(width - 1);
            let y = ((2 * row + 1) * height / (2 * rows)).min(height - 1);
            (x as u16, y as u16)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GameConfig;

    #[test]
    fn test_rewards_are_in_range_outside_starts() {
        let config = GameConfig::new(10, 10, 3).unwrap();
        let state = StateWriter::create_in_memory(&config);
        initialize(&state, &config, 7);

        let starts = starting_positions(&config);
        for y in 0..10 {
            for x in 0..10 {
                let v = state.cell(x, y);
                if starts.contains(&(x, y)) {
                    assert!(v <= 0, "start cell ({x},{y}) must be claimed, got {v}");
                } else {
                    assert!((1..=9).contains(&v), "cell ({x},{y}) out of range: {v}");
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_board() {
        let config = GameConfig::new(12, 10, 2).unwrap();
        let a = StateWriter::create_in_memory(&config);
        let b = StateWriter::create_in_memory(&config);
        initialize(&a, &config, 42);
        initialize(&b, &config, 42);

        for y in 0..10 {
            for x in 0..12 {
                assert_eq!(a.cell(x, y), b.cell(x, y));
            }
        }
    }

    #[test]
    fn test_starts_are_disjoint_and_in_bounds() {
        for n in 1..=MAX_AGENTS {
            let config = GameConfig::new(10, 10, n).unwrap();
            let starts = starting_positions(&config);
            assert_eq!(starts.len(), n);
            for (i, &(x, y)) in starts.iter().enumerate() {
                assert!(x < 10 && y < 10);
                for &other in &starts[..i] {
                    assert_ne!((x, y), other, "duplicate start for {n} agents");
                }
            }
        }
    }

    #[test]
    fn test_two_agent_starts_are_region_centers() {
        let config = GameConfig::new(10, 10, 2).unwrap();
        let starts = starting_positions(&config);
        assert_eq!(starts.as_slice(), &[(2, 5), (7, 5)]);
    }

    #[test]
    fn test_placement_claims_cell_for_agent() {
        let config = GameConfig::new(10, 10, 4).unwrap();
        let state = StateWriter::create_in_memory(&config);
        initialize(&state, &config, 1);

        for (i, &(x, y)) in starting_positions(&config).iter().enumerate() {
            assert_eq!(state.cell(x, y), -(i as i32));
            assert_eq!(state.agent_position(i), (x, y));
        }
    }
}
