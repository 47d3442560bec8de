//! Move-selection heuristics.
//!
//! Strategies are pluggable: they see a read-only snapshot and answer with
//! a direction, or `None` for "no move" (the agent then closes its channel
//! and exits). The engine never depends on which strategy runs.

use crate::core::{Direction, GameRng, GameSnapshot};

/// A move-selection heuristic over board snapshots.
pub trait Strategy: Send {
    /// Pick the next move for agent `me`, or `None` if it declines to move.
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction>;
}

/// Second ring around a cell, for the space heuristic.
const RING2: [(i32, i32); 16] = [
    (0, -2),
    (1, -2),
    (2, -2),
    (2, -1),
    (2, 0),
    (2, 1),
    (0, 2),
    (-1, 2),
    (-2, 2),
    (-2, 1),
    (-2, 0),
    (-2, -1),
    (1, 2),
    (-1, -2),
    (2, 2),
    (-2, -2),
];

/// Free cells in the two rings around `(x, y)`: ring one weighted as
/// mobility, ring two as loose "air".
fn space_around(snapshot: &GameSnapshot, x: u16, y: u16) -> i64 {
    let ring1 = i64::from(snapshot.mobility(x, y)) * 3;
    let ring2 = RING2
        .iter()
        .filter(|(dx, dy)| snapshot.cell_is_free(i32::from(x) + dx, i32::from(y) + dy))
        .count() as i64;
    ring1 + ring2
}

/// Scan the eight destinations from the agent's cell and keep the best
/// scoring free one. Optionally breaks score ties at random.
fn best_direction(
    snapshot: &GameSnapshot,
    me: usize,
    score: impl Fn(u16, u16) -> i64,
    tiebreak: Option<&mut GameRng>,
) -> Option<Direction> {
    let agent = &snapshot.agents[me];
    if agent.blocked {
        return None;
    }

    let mut tiebreak = tiebreak;
    let mut best: Option<(i64, Direction)> = None;
    for dir in Direction::ALL {
        let (nx, ny) = dir.step_from(agent.x, agent.y);
        if !snapshot.cell_is_free(nx, ny) {
            continue;
        }
        let value = score(nx as u16, ny as u16);
        let better = match best {
            None => true,
            Some((best_value, _)) => {
                value > best_value
                    || (value == best_value
                        && tiebreak.as_deref_mut().is_some_and(|rng| rng.gen_bool(0.5)))
            }
        };
        if better {
            best = Some((value, dir));
        }
    }
    best.map(|(_, dir)| dir)
}

/// Destination reward first, mobility as the tiebreaker.
pub struct GreedyPlus {
    rng: Option<GameRng>,
}

impl GreedyPlus {
    /// Deterministic greedy selection.
    #[must_use]
    pub fn new() -> Self {
        Self { rng: None }
    }

    /// Greedy selection with random tie-breaking.
    #[must_use]
    pub fn with_tiebreak(seed: u64) -> Self {
        Self {
            rng: Some(GameRng::new(seed).for_context("tiebreak")),
        }
    }
}

impl Default for GreedyPlus {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for GreedyPlus {
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction> {
        let score = |x: u16, y: u16| {
            i64::from(snapshot.cell(x, y)) * 10 + i64::from(snapshot.mobility(x, y))
        };
        best_direction(snapshot, me, score, self.rng.as_mut())
    }
}

/// Maximize breathing room: prefer destinations with free neighborhoods.
pub struct SpaceMax;

impl Strategy for SpaceMax {
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction> {
        best_direction(snapshot, me, |x, y| space_around(snapshot, x, y), None)
    }
}

/// Late-game scoring: the reward dominates, mobility only nudges.
pub struct EndgameHarvest;

impl Strategy for EndgameHarvest {
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction> {
        let score = |x: u16, y: u16| {
            i64::from(snapshot.cell(x, y)) * 20 + i64::from(snapshot.mobility(x, y))
        };
        best_direction(snapshot, me, score, None)
    }
}

/// Endgame threshold: switch to harvest once at most 15% of cells remain
/// free. The switch is one-way.
#[must_use]
pub fn endgame_reached(free_cells: u32, total_cells: u32) -> bool {
    free_cells * 100 <= total_cells * 15
}

enum Opening {
    Greedy,
    Space,
}

/// Default agent brain: picks an opening from the board shape, then
/// switches to [`EndgameHarvest`] once the board thins out.
pub struct AutoStrategy {
    opening: Option<Opening>,
    greedy: GreedyPlus,
    endgame: bool,
}

impl AutoStrategy {
    /// Seeded so random tie-breaking stays reproducible per agent.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            opening: None,
            greedy: GreedyPlus::with_tiebreak(seed),
            endgame: false,
        }
    }

    fn choose_opening(snapshot: &GameSnapshot) -> Opening {
        // Big crowded boards reward space; otherwise chase rewards.
        if snapshot.total_cells() >= 120 && snapshot.agents.len() >= 3 {
            Opening::Space
        } else {
            Opening::Greedy
        }
    }
}

impl Strategy for AutoStrategy {
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction> {
        if self.opening.is_none() {
            self.opening = Some(Self::choose_opening(snapshot));
        }
        if !self.endgame && endgame_reached(snapshot.free_cells(), snapshot.total_cells()) {
            self.endgame = true;
        }

        if self.endgame {
            return EndgameHarvest.pick_move(snapshot, me);
        }
        match self.opening {
            Some(Opening::Space) => SpaceMax.pick_move(snapshot, me),
            _ => self.greedy.pick_move(snapshot, me),
        }
    }
}
