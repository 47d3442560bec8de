//! Compass directions and the single-byte move encoding.
//!
//! Agents request moves as one byte on their channel: values 0-7 encode the
//! eight compass directions clockwise from north. Any other byte is rejected
//! during validation and counted as an invalid move.

use serde::{Deserialize, Serialize};

/// One of the eight compass directions, clockwise from north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Direction {
    /// All directions in wire order.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Decode a wire byte. Returns `None` for anything outside 0-7.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Direction> {
        Self::ALL.get(byte as usize).copied()
    }

    /// The wire byte for this direction.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// The (dx, dy) cell offset. North is negative y.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// Destination of a step from `(x, y)`, which may be out of bounds.
    #[must_use]
    pub fn step_from(self, x: u16, y: u16) -> (i32, i32) {
        let (dx, dy) = self.delta();
        (i32::from(x) + dx, i32::from(y) + dy)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::North => "N",
            Direction::NorthEast => "NE",
            Direction::East => "E",
            Direction::SouthEast => "SE",
            Direction::South => "S",
            Direction::SouthWest => "SW",
            Direction::West => "W",
            Direction::NorthWest => "NW",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for byte in 0..8u8 {
            let dir = Direction::from_byte(byte).unwrap();
            assert_eq!(dir.as_byte(), byte);
        }
    }

    #[test]
    fn test_out_of_range_bytes_rejected() {
        for byte in 8..=255u8 {
            assert_eq!(Direction::from_byte(byte), None);
        }
    }

    #[test]
    fn test_deltas_are_unit_steps() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            assert!(dx.abs() <= 1 && dy.abs() <= 1);
            assert!((dx, dy) != (0, 0));
        }
    }

    #[test]
    fn test_clockwise_from_north() {
        assert_eq!(Direction::from_byte(0), Some(Direction::North));
        assert_eq!(Direction::North.delta(), (0, -1));
        assert_eq!(Direction::East.delta(), (1, 0));
        assert_eq!(Direction::South.delta(), (0, 1));
        assert_eq!(Direction::West.delta(), (-1, 0));
    }
}
