//! Session configuration, stored as JSON

use super::area::Area;
use super::detail::LevelKind;
use crate::core::{Error, Result};
use crate::math::Coord;
use crate::streaming::LodPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of a [`TerrainSession`](super::TerrainSession)
///
/// Ranges are measured in tiles (Chebyshev distance from the viewer's tile).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// World units per tile
    pub tile_size: f32,
    pub main_resolution: i32,
    pub main_margins: i32,
    pub draft_resolution: i32,
    pub draft_margins: i32,
    /// Tiles within this range are kept generated
    pub generate_range: i32,
    /// Tiles beyond this range are recycled by `deploy`
    pub retain_range: i32,
    /// Tiles within this range show main detail
    pub draft_switch_range: i32,
    pub hide_far_terrains: bool,
    pub drafts_enabled: bool,
    /// Defer main apply until main would be shown
    pub lazy_main_apply: bool,
    /// Concurrent background jobs
    pub worker_threads: usize,
    /// Cooperative steps run per `update`
    pub steps_per_frame: usize,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            tile_size: 1000.0,
            main_resolution: 257,
            main_margins: 8,
            draft_resolution: 33,
            draft_margins: 2,
            generate_range: 2,
            retain_range: 4,
            draft_switch_range: 1,
            hide_far_terrains: true,
            drafts_enabled: true,
            lazy_main_apply: false,
            worker_threads: 4,
            steps_per_frame: 1,
        }
    }
}

impl TerrainSettings {
    /// Thresholds for the LOD decision
    pub fn lod_policy(&self) -> LodPolicy {
        LodPolicy {
            draft_switch_range: self.draft_switch_range,
            generate_range: self.generate_range,
            hide_far_terrains: self.hide_far_terrains,
            drafts_enabled: self.drafts_enabled,
        }
    }

    /// Placement of one detail level of the tile at `coord`
    pub fn area(&self, coord: Coord, kind: LevelKind) -> Area {
        match kind {
            LevelKind::Main => Area::new(coord, self.tile_size, self.main_resolution, self.main_margins),
            LevelKind::Draft => Area::new(coord, self.tile_size, self.draft_resolution, self.draft_margins),
        }
    }

    pub fn resolution(&self, kind: LevelKind) -> i32 {
        match kind {
            LevelKind::Main => self.main_resolution,
            LevelKind::Draft => self.draft_resolution,
        }
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.tile_size <= 0.0 {
            return Err(Error::Config(format!("tile_size must be positive, got {}", self.tile_size)));
        }
        if self.main_resolution < 2 || self.draft_resolution < 2 {
            return Err(Error::Config("resolutions must be at least 2".into()));
        }
        if self.main_margins < 0 || self.draft_margins < 0 {
            return Err(Error::Config("margins must not be negative".into()));
        }
        if self.retain_range < self.generate_range {
            return Err(Error::Config(format!(
                "retain_range ({}) is smaller than generate_range ({})",
                self.retain_range, self.generate_range
            )));
        }
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Save settings to a JSON file
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }
}
