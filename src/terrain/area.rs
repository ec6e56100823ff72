//! Real-world placement of a tile's grids

use crate::core::types::Vec2;
use crate::math::{Coord, CoordRect};
use serde::{Deserialize, Serialize};

/// Placement of one detail level of a tile
///
/// Grids are addressed in absolute pixel space. Neighboring tiles share
/// their border pixel row/column, so the active rect of tile `(x, z)` starts
/// at `(x, z) * (resolution - 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub coord: Coord,
    /// World units per tile
    pub tile_size: f32,
    /// Pixels per tile side, borders included
    pub resolution: i32,
    /// Extra pixels generated around the active rect
    pub margins: i32,
}

impl Area {
    pub fn new(coord: Coord, tile_size: f32, resolution: i32, margins: i32) -> Self {
        Self { coord, tile_size, resolution: resolution.max(2), margins: margins.max(0) }
    }

    /// Pixels that end up on the terrain
    pub fn active(&self) -> CoordRect {
        CoordRect::square(self.coord * (self.resolution - 1), self.resolution)
    }

    /// Active rect plus margins; the rect grids are generated for
    pub fn full(&self) -> CoordRect {
        self.active().expanded(self.margins)
    }

    /// World units per pixel step
    pub fn pixel_size(&self) -> f32 {
        self.tile_size / (self.resolution - 1) as f32
    }

    /// World position of the tile's minimum corner
    pub fn world_origin(&self) -> Vec2 {
        Vec2::new(self.coord.x as f32, self.coord.z as f32) * self.tile_size
    }

    /// World position of an absolute pixel
    pub fn pixel_to_world(&self, pixel: Coord) -> Vec2 {
        Vec2::new(pixel.x as f32, pixel.z as f32) * self.pixel_size()
    }
}
