//! Integer rectangles and coordinate wrapping

use super::coord::Coord;
use serde::{Deserialize, Serialize};

/// How out-of-range coordinates are brought back into a rect
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileMode {
    /// Clamp to the nearest border cell
    #[default]
    Clamp,
    /// Repeat the rect
    Tile,
    /// Repeat the rect, mirroring every other copy
    PingPong,
}

/// Axis-aligned integer rectangle defined by offset and size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordRect {
    pub offset: Coord,
    pub size: Coord,
}

impl CoordRect {
    pub const fn new(offset: Coord, size: Coord) -> Self {
        Self { offset, size }
    }

    pub const fn from_xz(offset_x: i32, offset_z: i32, size_x: i32, size_z: i32) -> Self {
        Self {
            offset: Coord::new(offset_x, offset_z),
            size: Coord::new(size_x, size_z),
        }
    }

    /// Square rect of `size` cells starting at `offset`
    pub const fn square(offset: Coord, size: i32) -> Self {
        Self { offset, size: Coord::new(size, size) }
    }

    /// Inclusive min corner
    pub fn min(&self) -> Coord {
        self.offset
    }

    /// Exclusive max corner
    pub fn max(&self) -> Coord {
        self.offset + self.size
    }

    /// Number of cells; zero for empty or negative sizes
    pub fn count(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.size.x as usize * self.size.z as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0 || self.size.z <= 0
    }

    /// Check if a cell lies inside the rect
    pub fn contains(&self, pos: Coord) -> bool {
        pos.x >= self.offset.x && pos.x < self.offset.x + self.size.x &&
        pos.z >= self.offset.z && pos.z < self.offset.z + self.size.z
    }

    /// Overlapping part of two rects; size is zero when they do not overlap
    pub fn intersect(&self, other: &CoordRect) -> CoordRect {
        let min = self.min().max(other.min());
        let max = self.max().min(other.max());
        let size = Coord::new((max.x - min.x).max(0), (max.z - min.z).max(0));
        CoordRect::new(min, size)
    }

    /// Grow the rect by `margins` cells on every side
    pub fn expanded(&self, margins: i32) -> CoordRect {
        CoordRect::new(
            self.offset - Coord::new(margins, margins),
            self.size + Coord::new(margins * 2, margins * 2),
        )
    }

    /// Wrap an arbitrary cell position into the rect
    pub fn wrap(&self, pos: Coord, mode: TileMode) -> Coord {
        Coord::new(
            wrap_axis(pos.x, self.offset.x, self.size.x, mode),
            wrap_axis(pos.z, self.offset.z, self.size.z, mode),
        )
    }

    /// Iterate over all cells, row by row
    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        let (min, max) = (self.min(), self.max());
        (min.z..max.z).flat_map(move |z| (min.x..max.x).map(move |x| Coord::new(x, z)))
    }
}

fn wrap_axis(value: i32, offset: i32, size: i32, mode: TileMode) -> i32 {
    if size <= 0 {
        return offset;
    }
    let local = value - offset;
    let wrapped = match mode {
        TileMode::Clamp => local.clamp(0, size - 1),
        TileMode::Tile => local.rem_euclid(size),
        TileMode::PingPong => {
            let period = size * 2;
            let p = local.rem_euclid(period);
            if p < size { p } else { period - 1 - p }
        }
    };
    wrapped + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_overlap() {
        let a = CoordRect::from_xz(0, 0, 10, 10);
        let b = CoordRect::from_xz(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), CoordRect::from_xz(5, 5, 5, 5));
        assert_eq!(a.intersect(&b).count(), 25);
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = CoordRect::from_xz(0, 0, 4, 4);
        let b = CoordRect::from_xz(10, 0, 4, 4);
        let i = a.intersect(&b);
        assert!(i.is_empty());
        assert_eq!(i.count(), 0);
    }

    #[test]
    fn test_contains() {
        let r = CoordRect::from_xz(-2, 3, 4, 2);
        assert!(r.contains(Coord::new(-2, 3)));
        assert!(r.contains(Coord::new(1, 4)));
        assert!(!r.contains(Coord::new(2, 4)));
        assert!(!r.contains(Coord::new(0, 5)));
    }

    #[test]
    fn test_wrap_modes() {
        let r = CoordRect::from_xz(10, 0, 4, 4);
        assert_eq!(r.wrap(Coord::new(8, 0), TileMode::Clamp).x, 10);
        assert_eq!(r.wrap(Coord::new(15, 0), TileMode::Clamp).x, 13);
        assert_eq!(r.wrap(Coord::new(14, 0), TileMode::Tile).x, 10);
        assert_eq!(r.wrap(Coord::new(9, 0), TileMode::Tile).x, 13);
        // 14 is the first mirrored cell
        assert_eq!(r.wrap(Coord::new(14, 0), TileMode::PingPong).x, 13);
        assert_eq!(r.wrap(Coord::new(17, 0), TileMode::PingPong).x, 10);
        assert_eq!(r.wrap(Coord::new(18, 0), TileMode::PingPong).x, 10);
    }

    #[test]
    fn test_cells_row_major() {
        let r = CoordRect::from_xz(1, 1, 2, 2);
        let cells: Vec<Coord> = r.cells().collect();
        assert_eq!(cells, vec![
            Coord::new(1, 1), Coord::new(2, 1),
            Coord::new(1, 2), Coord::new(2, 2),
        ]);
    }
}
