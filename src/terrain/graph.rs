//! The generation graph seam

use super::detail::LevelKind;
use super::events::{NodeEvent, TileEvents};
use super::sink::TerrainSink;
use super::tile::TileId;
use super::tile_data::TileData;
use crate::math::Coord;
use crate::streaming::StopToken;

/// What a running pass knows about itself
pub struct GenerateContext<'a> {
    pub tile: TileId,
    pub coord: Coord,
    pub kind: LevelKind,
    pub stop: &'a StopToken,
    pub(crate) events: &'a TileEvents,
}

impl<'a> GenerateContext<'a> {
    /// The pass was stopped or superseded; return without further work
    pub fn is_stopped(&self) -> bool {
        self.stop.should_abort()
    }

    /// Report a finished node to `node_generated` observers
    pub fn node_generated(&self, node: &str, data: &TileData) {
        let event = NodeEvent { tile: self.tile, coord: self.coord, kind: self.kind, node, data };
        self.events.node_generated.notify_with(|cb| cb(&event));
    }
}

/// A node graph evaluated per tile, treated as opaque by the scheduler
///
/// `generate` and `finalize` run on background workers. They must poll
/// [`GenerateContext::is_stopped`] and return early without touching any
/// sink. `finalize` queues the apply operations for the pass.
pub trait Graph: Send + Sync {
    fn seed(&self) -> i32;

    /// Bumped whenever the graph changes
    fn revision(&self) -> u64 {
        0
    }

    /// Main-thread hook before the pass is queued
    fn prepare(&self, _data: &mut TileData, _sink: Option<&dyn TerrainSink>) {}

    fn generate(&self, data: &mut TileData, ctx: &GenerateContext<'_>);

    fn finalize(&self, data: &mut TileData, ctx: &GenerateContext<'_>);
}
