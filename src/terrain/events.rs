//! Session events
//!
//! Threads: `before_prepare`, `tile_applied`, `lod_switched`, `all_complete`
//! and `preview_changed` fire on the thread calling
//! [`TerrainSession::update`](super::TerrainSession::update).
//! `before_generate`, `node_generated` and `tile_finalized` fire on the
//! background worker running the pass.

use super::detail::LevelKind;
use super::tile::TileId;
use super::tile_data::TileData;
use crate::core::ObserverList;
use crate::math::Coord;
use crate::streaming::{LodChoice, StopToken};

/// A detail level reached a lifecycle point
#[derive(Clone, Copy)]
pub struct TileEvent<'a> {
    pub tile: TileId,
    pub coord: Coord,
    pub kind: LevelKind,
    pub data: &'a TileData,
    /// Token of the pass, absent once the pass is over
    pub stop: Option<&'a StopToken>,
}

/// A graph node finished for a tile
#[derive(Clone, Copy)]
pub struct NodeEvent<'a> {
    pub tile: TileId,
    pub coord: Coord,
    pub kind: LevelKind,
    pub node: &'a str,
    pub data: &'a TileData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LodSwitchEvent {
    pub tile: TileId,
    pub coord: Coord,
    pub previous: LodChoice,
    pub current: LodChoice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewEvent {
    pub previous: Option<TileId>,
    pub current: Option<TileId>,
}

/// Nothing is queued or running anywhere in the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompleteEvent {
    pub tiles: usize,
}

pub type TileCallback = dyn Fn(&TileEvent<'_>) + Send + Sync;
pub type NodeCallback = dyn Fn(&NodeEvent<'_>) + Send + Sync;
pub type LodSwitchCallback = dyn Fn(&LodSwitchEvent) + Send + Sync;
pub type PreviewCallback = dyn Fn(&PreviewEvent) + Send + Sync;
pub type CompleteCallback = dyn Fn(&CompleteEvent) + Send + Sync;

/// Observer lists owned by one session
#[derive(Default, Debug)]
pub struct TileEvents {
    pub before_prepare: ObserverList<TileCallback>,
    pub before_generate: ObserverList<TileCallback>,
    pub node_generated: ObserverList<NodeCallback>,
    pub tile_finalized: ObserverList<TileCallback>,
    pub tile_applied: ObserverList<TileCallback>,
    pub lod_switched: ObserverList<LodSwitchCallback>,
    pub all_complete: ObserverList<CompleteCallback>,
    pub preview_changed: ObserverList<PreviewCallback>,
}

impl TileEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn emit_tile(list: &ObserverList<TileCallback>, event: &TileEvent<'_>) {
        list.notify_with(|cb| cb(event));
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.before_prepare.clear();
        self.before_generate.clear();
        self.node_generated.clear();
        self.tile_finalized.clear();
        self.tile_applied.clear();
        self.lod_switched.clear();
        self.all_complete.clear();
        self.preview_changed.clear();
    }
}
