//! Tile session: owns every tile and schedules their passes
//!
//! A [`TerrainSession`] is driven from one thread (the "main" thread). Graph
//! evaluation and welding run on a [`WorkQueue`]; their results come back over
//! a channel and are turned into cooperative steps that touch the sinks. Call
//! [`TerrainSession::update`] once per frame.
//!
//! ```text
//! place/move ──► submit_pass ──► WorkQueue ──► JobOutcome ──► StepQueue ──► sink
//!                                  (generate, finalize, weld)   (apply, fixups, switch)
//! ```

mod apply;
mod generate;
mod switch;

use super::detail::{DetailLevel, LevelKind};
use super::events::{PreviewEvent, TileEvents};
use super::graph::Graph;
use super::persist::{LevelSnapshot, TileSnapshot};
use super::settings::TerrainSettings;
use super::sink::{MemorySinkFactory, SinkFactory, TerrainSink};
use super::tile::{Tile, TileId};
use super::tile_set::{EdgeBoard, TileSet};
use super::weld::{EdgeFixup, EdgesSet};
use crate::core::{Error, Result};
use crate::math::Coord;
use crate::streaming::{
    DRAFT_PRIORITY_BOOST, LodChoice, LodPolicy, StepQueue, StopToken, ThreadedWorkQueue, WorkId,
    WorkQueue, level_priority,
};
use generate::JobOutcome;
use glam::Vec2;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Fixups run before any apply so sinks never show an unwelded border for long
const FIXUP_PRIORITY: i32 = DRAFT_PRIORITY_BOOST * 2;

/// One unit of main-thread work
pub(crate) enum Step {
    /// Drain apply operations of the pass owning `stop`
    Apply { tile: TileId, kind: LevelKind, stop: Arc<StopToken> },
    SwitchLod { tile: TileId },
    /// Matched by coordinate and generation, not tile id
    Fixup(EdgeFixup),
}

impl Step {
    pub(crate) fn targets(&self, id: TileId) -> bool {
        match self {
            Step::Apply { tile, .. } | Step::SwitchLod { tile } => *tile == id,
            Step::Fixup(_) => false,
        }
    }

    pub(crate) fn targets_level(&self, id: TileId, level: LevelKind) -> bool {
        matches!(self, Step::Apply { tile, kind, .. } if *tile == id && *kind == level)
    }
}

/// Counters for what the session has done so far
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub passes_submitted: u64,
    pub passes_completed: u64,
    pub passes_abandoned: u64,
    pub passes_restarted: u64,
    pub applies_finished: u64,
    pub lod_switches: u64,
    pub switch_welds: u64,
    pub fixups_applied: u64,
    pub fixups_stale: u64,
}

/// Result of one [`TerrainSession::deploy`] call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeployStats {
    pub placed: usize,
    pub moved: usize,
    pub removed: usize,
}

/// Coordinator of all tiles in one terrain
pub struct TerrainSession {
    settings: TerrainSettings,
    policy: LodPolicy,
    graph: Arc<dyn Graph>,
    tiles: TileSet,
    board: EdgeBoard,
    work: Box<dyn WorkQueue>,
    steps: StepQueue<Step>,
    results_tx: UnboundedSender<JobOutcome>,
    results_rx: UnboundedReceiver<JobOutcome>,
    sinks: Box<dyn SinkFactory>,
    events: Arc<TileEvents>,
    stats: SessionStats,
    next_work_id: WorkId,
    preview: Option<TileId>,
}

impl TerrainSession {
    /// Create a session over caller-provided work queue and sink factory
    pub fn new(
        settings: TerrainSettings,
        graph: Arc<dyn Graph>,
        work: Box<dyn WorkQueue>,
        sinks: Box<dyn SinkFactory>,
    ) -> Result<Self> {
        settings.validate()?;
        let (results_tx, results_rx) = unbounded_channel();
        log::info!(
            "Terrain session: tile size {}, main {}px, draft {}px, range {}",
            settings.tile_size,
            settings.main_resolution,
            settings.draft_resolution,
            settings.generate_range
        );

        Ok(Self {
            policy: settings.lod_policy(),
            settings,
            graph,
            tiles: TileSet::new(),
            board: EdgeBoard::new(),
            work,
            steps: StepQueue::new(),
            results_tx,
            results_rx,
            sinks,
            events: Arc::new(TileEvents::new()),
            stats: SessionStats::default(),
            next_work_id: 0,
            preview: None,
        })
    }

    /// Session with a thread pool of `worker_threads` and in-memory sinks
    pub fn threaded(settings: TerrainSettings, graph: Arc<dyn Graph>) -> Result<Self> {
        let work = ThreadedWorkQueue::new(settings.worker_threads)?;
        Self::new(settings, graph, Box::new(work), Box::new(MemorySinkFactory::new()))
    }

    // --- Tiles ---

    /// Add a working-set tile with a main level, plus a draft when enabled
    pub fn place(&mut self, coord: Coord, distance: f32) -> Result<TileId> {
        let id = self
            .tiles
            .insert(coord, distance)
            .ok_or_else(|| Error::Streaming(format!("tile already placed at {}", coord)))?;
        let drafts = self.settings.drafts_enabled;
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.main = Some(DetailLevel::new(LevelKind::Main));
            if drafts {
                tile.draft = Some(DetailLevel::new(LevelKind::Draft));
            }
        }
        log::debug!("Placed {} at {} (distance {:.1})", id, coord, distance);
        self.start_generate(id);
        Ok(id)
    }

    /// Pin a tile in place, creating it if needed
    ///
    /// A draft is created when drafts are enabled, a main unless `draft_only`.
    /// Pinning with `draft_only` drops an existing main level.
    pub fn pin(&mut self, coord: Coord, draft_only: bool) -> Result<TileId> {
        let id = match self.tiles.id_at(coord) {
            Some(id) => id,
            None => self
                .tiles
                .insert(coord, 0.0)
                .ok_or_else(|| Error::Streaming(format!("cannot pin at {}", coord)))?,
        };
        let drafts = self.settings.drafts_enabled;

        let mut created = false;
        let mut drop_main = false;
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.pinned = true;
            if drafts && tile.draft.is_none() {
                tile.draft = Some(DetailLevel::new(LevelKind::Draft));
                created = true;
            }
            if !draft_only && tile.main.is_none() {
                tile.main = Some(DetailLevel::new(LevelKind::Main));
                created = true;
            }
            drop_main = draft_only && tile.main.is_some();
        }

        if drop_main {
            self.drop_level(id, LevelKind::Main);
        }
        if created {
            log::debug!("Pinned {} at {}", id, coord);
            self.start_generate(id);
        } else if drop_main {
            self.switch_lod(id);
        }
        Ok(id)
    }

    /// Cancel, hide and discard one level of a tile
    fn drop_level(&mut self, id: TileId, kind: LevelKind) {
        self.cancel_level(id, kind);
        let Some(tile) = self.tiles.get_mut(id) else { return };
        let coord = tile.coord;
        if let Some(mut level) = tile.slot_mut(kind).take() {
            if let Some(sink) = level.sink.as_mut() {
                sink.set_active(false);
            }
        }
        self.board.retract(coord, kind);
    }

    /// Move a tile to a new coordinate and regenerate it there
    ///
    /// Running passes are stopped and waited for. Sinks are hidden and
    /// dropped, cached edges are reset and the object pool is cleared.
    pub fn move_tile(&mut self, id: TileId, coord: Coord, distance: f32) -> Result<()> {
        if let Some(other) = self.tiles.id_at(coord) {
            if other != id {
                return Err(Error::Streaming(format!("{} occupied by {}", coord, other)));
            }
        }
        let old = self.tile(id)?.coord;

        self.cancel_level(id, LevelKind::Main);
        self.cancel_level(id, LevelKind::Draft);
        self.steps.retain(|s| !s.targets(id));
        self.board.remove(old);
        self.tiles.relocate(id, coord);

        let Some(tile) = self.tiles.get_mut(id) else {
            return Err(Error::UnknownTile(id));
        };
        tile.distance = distance;
        tile.active = LodChoice::None;
        tile.objects.clear();
        tile.objects.set_visible(false);
        for level in tile.levels_mut() {
            if let Some(mut sink) = level.sink.take() {
                sink.set_active(false);
            }
            level.data = None;
            level.pass = None;
            level.resuming = None;
            level.edges = Arc::new(EdgesSet::default());
            level.generate_ready = false;
            level.apply_ready = false;
        }

        log::debug!("Moved {} from {} to {}", id, old, coord);
        self.start_generate(id);
        Ok(())
    }

    /// Update remoteness, reprioritize queued passes and re-evaluate LOD
    pub fn set_distance(&mut self, id: TileId, distance: f32) -> Result<()> {
        let tile = self.tiles.get_mut(id).ok_or(Error::UnknownTile(id))?;
        tile.distance = distance;
        for level in tile.levels() {
            if let Some(task) = &level.task {
                self.work.set_priority(task.id, level_priority(distance, level.kind().is_draft()));
            }
        }
        self.switch_lod(id);
        Ok(())
    }

    /// Remove a tile, stopping its passes and hiding its sinks
    pub fn remove(&mut self, id: TileId) -> Result<()> {
        self.tile(id)?;
        self.cancel_level(id, LevelKind::Main);
        self.cancel_level(id, LevelKind::Draft);
        self.steps.retain(|s| !s.targets(id));

        let Some(mut tile) = self.tiles.remove(id) else {
            return Err(Error::UnknownTile(id));
        };
        for level in tile.levels_mut() {
            if let Some(sink) = level.sink.as_mut() {
                sink.set_active(false);
            }
        }
        self.board.remove(tile.coord);
        log::debug!("Removed {} at {}", id, tile.coord);

        if self.preview == Some(id) {
            self.set_preview(None);
        }
        Ok(())
    }

    /// Regenerate a tile where it is, e.g. after a resolution change
    pub fn resize(&mut self, id: TileId) -> Result<()> {
        let tile = self.tile(id)?;
        let (coord, distance) = (tile.coord, tile.distance);
        self.move_tile(id, coord, distance)
    }

    /// Start fresh passes on every tile
    pub fn regenerate_all(&mut self) {
        let ids = self.tiles.ids();
        log::info!("Regenerating {} tiles", ids.len());
        for id in ids {
            self.start_generate(id);
        }
    }

    /// Swap the graph and regenerate everything with it
    pub fn set_graph(&mut self, graph: Arc<dyn Graph>) {
        self.graph = graph;
        self.regenerate_all();
    }

    /// Stop both levels' passes, waiting for running jobs to unwind
    ///
    /// Readiness flags are left as they were.
    pub fn stop_generate(&mut self, id: TileId) -> Result<()> {
        self.tile(id)?;
        self.cancel_level(id, LevelKind::Main);
        self.cancel_level(id, LevelKind::Draft);
        Ok(())
    }

    /// Mark one tile as the preview tile; takes effect at its next pass
    pub fn set_preview(&mut self, tile: Option<TileId>) {
        if self.preview == tile {
            return;
        }
        let event = PreviewEvent { previous: self.preview, current: tile };
        self.preview = tile;
        self.events.preview_changed.notify_with(|cb| cb(&event));
    }

    /// Make the working set cover every coordinate within `generate_range` of `center`
    ///
    /// Tiles beyond `retain_range` are reused farthest first, then removed
    /// if left over. Pinned tiles are never moved or removed.
    pub fn deploy(&mut self, center: Coord) -> DeployStats {
        let range = self.settings.generate_range;
        let retain = self.settings.retain_range.max(range);
        let mut stats = DeployStats::default();

        let mut missing: Vec<Coord> = TileSet::coords_in_range(center, range)
            .filter(|c| !self.tiles.contains(*c))
            .collect();
        missing.sort_by_key(|c| (c.chebyshev(center), c.z, c.x));

        let mut spare: Vec<(i32, TileId)> = self
            .tiles
            .iter()
            .filter(|t| !t.pinned && t.coord.chebyshev(center) > retain)
            .map(|t| (t.coord.chebyshev(center), t.id()))
            .collect();
        // nearest first so pop() yields the farthest
        spare.sort();

        for coord in missing {
            let distance = coord.chebyshev(center) as f32;
            if let Some((_, id)) = spare.pop() {
                match self.move_tile(id, coord, distance) {
                    Ok(()) => stats.moved += 1,
                    Err(e) => log::warn!("Could not move {}: {}", id, e),
                }
            } else {
                match self.place(coord, distance) {
                    Ok(_) => stats.placed += 1,
                    Err(e) => log::warn!("Could not place tile at {}: {}", coord, e),
                }
            }
        }

        for (_, id) in spare {
            if self.remove(id).is_ok() {
                stats.removed += 1;
            }
        }

        for id in self.tiles.ids() {
            let Some(tile) = self.tiles.get(id) else { continue };
            if tile.pinned {
                continue;
            }
            let distance = tile.coord.chebyshev(center) as f32;
            if tile.distance != distance {
                let _ = self.set_distance(id, distance);
            }
        }

        if stats != DeployStats::default() {
            log::debug!("Deploy around {}: {:?}", center, stats);
        }
        stats
    }

    /// [`deploy`](Self::deploy) around a world-space position
    pub fn deploy_at(&mut self, position: Vec2) -> DeployStats {
        let size = self.settings.tile_size;
        let center = Coord::new((position.x / size).floor() as i32, (position.y / size).floor() as i32);
        self.deploy(center)
    }

    // --- Driving ---

    /// Take finished passes off the channel, then run up to `steps_per_frame` steps
    ///
    /// Returns the number of steps run.
    pub fn update(&mut self) -> usize {
        self.drain_results();
        let mut ran = 0;
        while ran < self.settings.steps_per_frame && self.tick() {
            ran += 1;
        }
        ran
    }

    /// Whether any pass is queued, running or waiting to be applied
    pub fn is_working(&self) -> bool {
        self.work.is_working()
            || !self.steps.is_empty()
            || self.tiles.iter().any(Tile::is_generating)
    }

    pub fn progress(&self, id: TileId, generate_complexity: f32, apply_complexity: f32) -> Result<(f32, f32)> {
        Ok(self.tile(id)?.progress(generate_complexity, apply_complexity))
    }

    pub fn is_ready(&self, id: TileId) -> Result<bool> {
        Ok(self.tile(id)?.is_ready())
    }

    // --- Accessors ---

    pub fn tile(&self, id: TileId) -> Result<&Tile> {
        self.tiles.get(id).ok_or(Error::UnknownTile(id))
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn graph(&self) -> &Arc<dyn Graph> {
        &self.graph
    }

    /// Observer lists; subscribe before placing tiles to see every event
    pub fn events(&self) -> &Arc<TileEvents> {
        &self.events
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn preview(&self) -> Option<TileId> {
        self.preview
    }

    pub fn sink(&self, id: TileId, kind: LevelKind) -> Option<&dyn TerrainSink> {
        self.tiles.get(id)?.level(kind)?.sink()
    }

    /// Hand a level an existing sink, e.g. after restoring a snapshot
    pub fn attach_sink(&mut self, id: TileId, kind: LevelKind, mut sink: Box<dyn TerrainSink>) -> Result<()> {
        let tile = self.tiles.get_mut(id).ok_or(Error::UnknownTile(id))?;
        let shown = matches!(
            (tile.active, kind),
            (LodChoice::Main, LevelKind::Main) | (LodChoice::Draft, LevelKind::Draft)
        );
        let level = tile
            .level_mut(kind)
            .ok_or_else(|| Error::Streaming(format!("{} has no {} level", id, kind)))?;
        sink.set_active(shown);
        level.sink = Some(sink);
        Ok(())
    }

    // --- Persistence ---

    /// Edges and readiness of one tile
    pub fn snapshot(&self, id: TileId) -> Result<TileSnapshot> {
        let tile = self.tile(id)?;
        let level = |l: &DetailLevel| LevelSnapshot {
            edges: EdgesSet::clone(&l.edges),
            generate_ready: l.generate_ready,
            apply_ready: l.apply_ready,
        };
        Ok(TileSnapshot {
            coord: tile.coord,
            distance: tile.distance,
            main: tile.main().map(level),
            draft: tile.draft().map(level),
        })
    }

    pub fn snapshots(&self) -> Vec<TileSnapshot> {
        self.tiles.ids().into_iter().filter_map(|id| self.snapshot(id).ok()).collect()
    }

    /// Recreate a tile from a snapshot
    ///
    /// Levels that were fully ready keep their flags and publish their edges
    /// for welding; everything else is regenerated.
    pub fn restore(&mut self, snapshot: &TileSnapshot) -> Result<TileId> {
        let coord = snapshot.coord;
        let id = self
            .tiles
            .insert(coord, snapshot.distance)
            .ok_or_else(|| Error::Streaming(format!("tile already placed at {}", coord)))?;

        let mut pending = Vec::new();
        let Some(tile) = self.tiles.get_mut(id) else {
            return Err(Error::UnknownTile(id));
        };
        for (kind, saved) in [(LevelKind::Main, &snapshot.main), (LevelKind::Draft, &snapshot.draft)] {
            let Some(saved) = saved else { continue };
            let mut level = DetailLevel::new(kind);
            level.edges = Arc::new(saved.edges.clone());
            let (generate_ready, apply_ready) = saved.restored_flags();
            level.restore_flags(generate_ready, apply_ready);

            if level.is_ready() && level.edges.ready {
                self.board.publish(coord, kind, Arc::clone(&level.edges));
            } else {
                pending.push(kind);
            }
            *tile.slot_mut(kind) = Some(level);
        }

        log::debug!("Restored {} at {} ({} levels to regenerate)", id, coord, pending.len());
        for kind in pending {
            self.submit_pass(id, kind);
        }
        self.switch_lod(id);
        Ok(id)
    }
}

impl Drop for TerrainSession {
    fn drop(&mut self) {
        for tile in self.tiles.iter() {
            for level in tile.levels() {
                if let Some(task) = &level.task {
                    task.stop.stop();
                }
            }
        }
    }
}

impl std::fmt::Debug for TerrainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainSession")
            .field("tiles", &self.tiles.len())
            .field("steps", &self.steps.len())
            .field("stats", &self.stats)
            .field("preview", &self.preview)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::ManualWorkQueue;
    use crate::terrain::noise_graph::{NoiseGraph, NoiseParams};

    fn small_settings() -> TerrainSettings {
        TerrainSettings {
            main_resolution: 17,
            main_margins: 2,
            draft_resolution: 5,
            draft_margins: 1,
            ..TerrainSettings::default()
        }
    }

    fn session() -> (TerrainSession, ManualWorkQueue) {
        let work = ManualWorkQueue::new();
        let graph = Arc::new(NoiseGraph::new(NoiseParams::default()));
        let session = TerrainSession::new(
            small_settings(),
            graph,
            Box::new(work.clone()),
            Box::new(MemorySinkFactory::new()),
        )
        .unwrap();
        (session, work)
    }

    fn settle(session: &mut TerrainSession, work: &ManualWorkQueue) {
        for _ in 0..1000 {
            work.run_all();
            session.update();
            if !session.is_working() {
                return;
            }
        }
        panic!("session did not settle");
    }

    #[test]
    fn test_place_generates_both_levels() {
        let (mut session, work) = session();
        let id = session.place(Coord::new(0, 0), 0.0).unwrap();
        assert_eq!(work.pending_names(), vec!["draft (0, 0)", "main (0, 0)"]);

        settle(&mut session, &work);
        assert!(session.is_ready(id).unwrap());
        assert_eq!(session.tile(id).unwrap().active(), LodChoice::Main);
    }

    #[test]
    fn test_place_twice_fails() {
        let (mut session, _work) = session();
        session.place(Coord::new(1, 1), 0.0).unwrap();
        assert!(session.place(Coord::new(1, 1), 0.0).is_err());
    }

    #[test]
    fn test_pin_draft_only_drops_main() {
        let (mut session, work) = session();
        let id = session.pin(Coord::new(0, 0), false).unwrap();
        assert!(session.tile(id).unwrap().main().is_some());

        let again = session.pin(Coord::new(0, 0), true).unwrap();
        assert_eq!(again, id);
        let tile = session.tile(id).unwrap();
        assert!(tile.is_pinned());
        assert!(tile.main().is_none());
        assert!(tile.draft().is_some());

        settle(&mut session, &work);
        assert_eq!(session.tile(id).unwrap().active(), LodChoice::Draft);
    }

    #[test]
    fn test_move_resets_level_state() {
        let (mut session, work) = session();
        let id = session.place(Coord::new(0, 0), 0.0).unwrap();
        settle(&mut session, &work);

        session.move_tile(id, Coord::new(5, 5), 0.0).unwrap();
        let tile = session.tile(id).unwrap();
        assert_eq!(tile.coord(), Coord::new(5, 5));
        assert_eq!(tile.active(), LodChoice::None);
        assert!(tile.objects().is_empty());
        assert!(!tile.main().unwrap().is_ready());
        assert!(session.tiles().at(Coord::new(0, 0)).is_none());

        settle(&mut session, &work);
        assert!(session.is_ready(id).unwrap());
    }

    #[test]
    fn test_deploy_reuses_far_tiles() {
        let mut settings = small_settings();
        settings.generate_range = 1;
        settings.retain_range = 1;
        let work = ManualWorkQueue::new();
        let graph = Arc::new(NoiseGraph::new(NoiseParams::default()));
        let mut session =
            TerrainSession::new(settings, graph, Box::new(work.clone()), Box::new(MemorySinkFactory::new()))
                .unwrap();

        let first = session.deploy(Coord::new(0, 0));
        assert_eq!(first, DeployStats { placed: 9, moved: 0, removed: 0 });

        let second = session.deploy(Coord::new(1, 0));
        assert_eq!(second, DeployStats { placed: 0, moved: 3, removed: 0 });
        assert_eq!(session.tiles().len(), 9);
        for coord in TileSet::coords_in_range(Coord::new(1, 0), 1) {
            assert!(session.tiles().contains(coord), "missing {}", coord);
        }
    }

    #[test]
    fn test_set_preview_fires_once() {
        let (mut session, _work) = session();
        let id = session.place(Coord::new(0, 0), 0.0).unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.events().preview_changed.subscribe(Arc::new(move |e: &PreviewEvent| {
            sink.lock().unwrap().push(e.current);
        }));

        session.set_preview(Some(id));
        session.set_preview(Some(id));
        session.remove(id).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(id), None]);
        assert_eq!(session.preview(), None);
    }

    #[test]
    fn test_unknown_tile_errors() {
        let (mut session, _work) = session();
        let id = session.place(Coord::new(0, 0), 0.0).unwrap();
        session.remove(id).unwrap();
        assert!(matches!(session.is_ready(id), Err(Error::UnknownTile(_))));
        assert!(session.set_distance(id, 3.0).is_err());
    }

    #[test]
    fn test_restore_ready_tile_needs_no_pass() {
        let (mut session, work) = session();
        let id = session.place(Coord::new(0, 0), 0.0).unwrap();
        settle(&mut session, &work);
        let snapshot = session.snapshot(id).unwrap();
        session.remove(id).unwrap();

        let submitted = session.stats().passes_submitted;
        let restored = session.restore(&snapshot).unwrap();
        assert!(session.is_ready(restored).unwrap());
        assert_eq!(session.stats().passes_submitted, submitted);
        assert!(session.board.get(Coord::new(0, 0), LevelKind::Main).is_some());
    }
}
