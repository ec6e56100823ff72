//! Integer 2D coordinates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Integer address on the XZ plane
///
/// Used both for tile coordinates and for pixel positions inside a grid.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct Coord {
    pub x: i32,
    pub z: i32,
}

impl Coord {
    pub const ZERO: Coord = Coord { x: 0, z: 0 };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chebyshev distance (king moves)
    pub fn chebyshev(self, other: Coord) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    pub fn min(self, other: Coord) -> Coord {
        Coord::new(self.x.min(other.x), self.z.min(other.z))
    }

    pub fn max(self, other: Coord) -> Coord {
        Coord::new(self.x.max(other.x), self.z.max(other.z))
    }

    /// The 8 surrounding coordinates, edge-adjacent ones first
    pub fn neighbors(self) -> [Coord; 8] {
        [
            self + Coord::new(-1, 0),
            self + Coord::new(1, 0),
            self + Coord::new(0, -1),
            self + Coord::new(0, 1),
            self + Coord::new(-1, -1),
            self + Coord::new(1, -1),
            self + Coord::new(-1, 1),
            self + Coord::new(1, 1),
        ]
    }
}

impl Add for Coord {
    type Output = Coord;
    fn add(self, rhs: Coord) -> Coord {
        Coord::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for Coord {
    type Output = Coord;
    fn sub(self, rhs: Coord) -> Coord {
        Coord::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<i32> for Coord {
    type Output = Coord;
    fn mul(self, rhs: i32) -> Coord {
        Coord::new(self.x * rhs, self.z * rhs)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
