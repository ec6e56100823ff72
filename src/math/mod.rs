//! Integer coordinates and rectangles

pub mod coord;
pub mod rect;

pub use coord::Coord;
pub use rect::{CoordRect, TileMode};
