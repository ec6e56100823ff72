//! A spatial tile and its detail levels

use super::detail::{DetailLevel, LevelKind};
use super::objects::ObjectPool;
use crate::math::Coord;
use crate::streaming::{LodChoice, LodInputs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a tile within a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub(crate) u64);

impl TileId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

/// One spatial unit of terrain with up to two detail levels
///
/// At most one level's sink is active at a time; `active` records which.
#[derive(Debug)]
pub struct Tile {
    id: TileId,
    pub(crate) coord: Coord,
    /// Remoteness from the viewer, in tiles
    pub(crate) distance: f32,
    pub(crate) main: Option<DetailLevel>,
    pub(crate) draft: Option<DetailLevel>,
    pub(crate) active: LodChoice,
    pub(crate) pinned: bool,
    pub(crate) objects: ObjectPool,
}

impl Tile {
    pub(crate) fn new(id: TileId, coord: Coord, distance: f32) -> Self {
        Self {
            id,
            coord,
            distance,
            main: None,
            draft: None,
            active: LodChoice::None,
            pinned: false,
            objects: ObjectPool::default(),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Which level is currently shown
    pub fn active(&self) -> LodChoice {
        self.active
    }

    pub fn objects(&self) -> &ObjectPool {
        &self.objects
    }

    pub fn main(&self) -> Option<&DetailLevel> {
        self.main.as_ref()
    }

    pub fn draft(&self) -> Option<&DetailLevel> {
        self.draft.as_ref()
    }

    pub fn level(&self, kind: LevelKind) -> Option<&DetailLevel> {
        match kind {
            LevelKind::Main => self.main.as_ref(),
            LevelKind::Draft => self.draft.as_ref(),
        }
    }

    pub(crate) fn level_mut(&mut self, kind: LevelKind) -> Option<&mut DetailLevel> {
        match kind {
            LevelKind::Main => self.main.as_mut(),
            LevelKind::Draft => self.draft.as_mut(),
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: LevelKind) -> &mut Option<DetailLevel> {
        match kind {
            LevelKind::Main => &mut self.main,
            LevelKind::Draft => &mut self.draft,
        }
    }

    /// Existing levels, main first
    pub fn levels(&self) -> impl Iterator<Item = &DetailLevel> {
        self.main.iter().chain(self.draft.iter())
    }

    pub(crate) fn levels_mut(&mut self) -> impl Iterator<Item = &mut DetailLevel> {
        self.main.iter_mut().chain(self.draft.iter_mut())
    }

    pub fn lod_inputs(&self) -> LodInputs {
        LodInputs {
            main: self.main.as_ref().map(DetailLevel::readiness),
            draft: self.draft.as_ref().map(DetailLevel::readiness),
            distance: self.distance,
        }
    }

    /// Weighted progress as `(progress, max)`
    ///
    /// Main contributes `generate_complexity + apply_complexity`, with
    /// partial credit for a partly drained apply queue. Draft contributes
    /// one unit per readiness flag.
    pub fn progress(&self, generate_complexity: f32, apply_complexity: f32) -> (f32, f32) {
        let mut progress = 0.0;
        let mut max = 0.0;

        if let Some(main) = &self.main {
            max += generate_complexity + apply_complexity;
            if main.generate_ready() {
                progress += generate_complexity;
            }
            progress += apply_complexity * main.apply_progress();
        }

        if let Some(draft) = &self.draft {
            max += 2.0;
            if draft.generate_ready() {
                progress += 1.0;
            }
            if draft.apply_ready() {
                progress += 1.0;
            }
        }

        (progress, max)
    }

    /// Every existing level is generated and applied
    pub fn is_ready(&self) -> bool {
        self.levels().all(DetailLevel::is_ready)
    }

    /// Any level has a background job
    pub fn is_generating(&self) -> bool {
        self.levels().any(DetailLevel::has_task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_with_levels() -> Tile {
        let mut tile = Tile::new(TileId(1), Coord::new(2, 3), 1.5);
        tile.main = Some(DetailLevel::new(LevelKind::Main));
        tile.draft = Some(DetailLevel::new(LevelKind::Draft));
        tile
    }

    #[test]
    fn test_progress() {
        let mut tile = tile_with_levels();
        assert_eq!(tile.progress(3.0, 1.0), (0.0, 6.0));

        if let Some(draft) = tile.draft.as_mut() {
            draft.generate_ready = true;
            draft.apply_ready = true;
        }
        if let Some(main) = tile.main.as_mut() {
            main.generate_ready = true;
        }
        assert_eq!(tile.progress(3.0, 1.0), (5.0, 6.0));
        assert!(!tile.is_ready());

        if let Some(main) = tile.main.as_mut() {
            main.apply_ready = true;
        }
        assert_eq!(tile.progress(3.0, 1.0), (6.0, 6.0));
        assert!(tile.is_ready());
    }

    #[test]
    fn test_lod_inputs() {
        let mut tile = tile_with_levels();
        tile.draft = None;
        let inputs = tile.lod_inputs();
        assert!(inputs.main.is_some());
        assert!(inputs.draft.is_none());
        assert_eq!(inputs.distance, 1.5);
    }

    #[test]
    fn test_empty_tile_is_ready() {
        let tile = Tile::new(TileId(2), Coord::ZERO, 0.0);
        assert!(tile.is_ready());
        assert_eq!(tile.progress(1.0, 1.0), (0.0, 0.0));
        assert_eq!(format!("{}", tile.id()), "tile#2");
    }
}
