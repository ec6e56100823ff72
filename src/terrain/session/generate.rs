//! Submitting passes to the work queue and taking their results back

use super::{Step, TerrainSession, FIXUP_PRIORITY};
use crate::math::Coord;
use crate::streaming::{StopToken, TokenState, WorkId, WorkItem, level_priority};
use crate::terrain::detail::{LevelKind, PassTask, PhaseCell};
use crate::terrain::events::{TileEvent, TileEvents};
use crate::terrain::graph::{GenerateContext, Graph};
use crate::terrain::tile::TileId;
use crate::terrain::tile_data::TileData;
use crate::terrain::tile_set::EdgeBoard;
use crate::terrain::weld::{EdgeFixup, EdgesSet, weld_in_thread};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// What a background pass produced
pub(crate) enum PassResult {
    Completed { edges: EdgesSet, fixups: Vec<EdgeFixup> },
    /// Aborted at a step boundary; nothing may be applied
    Cancelled,
}

/// Message from a finished background pass to the session
pub(crate) struct JobOutcome {
    pub(crate) tile: TileId,
    pub(crate) kind: LevelKind,
    pub(crate) stop: Arc<StopToken>,
    pub(crate) data: TileData,
    pub(crate) result: PassResult,
}

/// Everything a background pass needs, moved into the job
struct PassJob {
    tile: TileId,
    coord: Coord,
    kind: LevelKind,
    generation: WorkId,
    data: TileData,
    graph: Arc<dyn Graph>,
    stop: Arc<StopToken>,
    phase: Arc<PhaseCell>,
    board: EdgeBoard,
    events: Arc<TileEvents>,
    results: UnboundedSender<JobOutcome>,
}

impl PassJob {
    /// Generate, finalize, read edges, weld, write edges; abort checks between steps
    fn run(mut self) {
        self.phase.set(PhaseCell::GENERATING);
        let stop = Arc::clone(&self.stop);
        let ctx = GenerateContext {
            tile: self.tile,
            coord: self.coord,
            kind: self.kind,
            stop: &stop,
            events: &self.events,
        };

        TileEvents::emit_tile(&self.events.before_generate, &self.event(Some(&stop)));

        if !stop.should_abort() {
            self.graph.generate(&mut self.data, &ctx);
        }
        if !stop.should_abort() {
            self.graph.finalize(&mut self.data, &ctx);
            TileEvents::emit_tile(&self.events.tile_finalized, &self.event(Some(&stop)));
        }

        let result = self.weld(&stop);
        self.phase.set(PhaseCell::FINISHED);

        let outcome = JobOutcome {
            tile: self.tile,
            kind: self.kind,
            stop,
            data: self.data,
            result,
        };
        if self.results.send(outcome).is_err() {
            log::trace!("Session gone, dropping result of {} {}", self.kind, self.coord);
        }
    }

    fn weld(&mut self, stop: &StopToken) -> PassResult {
        if stop.should_abort() {
            return PassResult::Cancelled;
        }
        self.phase.set(PhaseCell::WELDING);

        let mut edges = EdgesSet::read(&self.data, self.generation);
        if stop.should_abort() {
            return PassResult::Cancelled;
        }

        let hood = self.board.neighborhood(self.coord, self.kind);
        let fixups = weld_in_thread(&mut edges, self.kind, &hood);
        if stop.should_abort() {
            return PassResult::Cancelled;
        }

        edges.write(&mut self.data);
        PassResult::Completed { edges, fixups }
    }

    fn event<'a>(&'a self, stop: Option<&'a StopToken>) -> TileEvent<'a> {
        TileEvent { tile: self.tile, coord: self.coord, kind: self.kind, data: &self.data, stop }
    }
}

impl TerrainSession {
    /// Reset readiness and queue fresh passes for every level of a tile
    pub(super) fn start_generate(&mut self, id: TileId) {
        let Some(tile) = self.tiles.get_mut(id) else { return };
        for level in tile.levels_mut() {
            level.generate_ready = false;
            level.apply_ready = false;
        }
        let (has_draft, has_main) = (tile.draft.is_some(), tile.main.is_some());

        if has_draft {
            self.enqueue_draft(id);
        }
        if has_main {
            self.enqueue_main(id);
        }
        self.switch_lod(id);
    }

    /// Draft levels never wait: a running pass is flagged for restart,
    /// a queued one is replaced
    fn enqueue_draft(&mut self, id: TileId) {
        let Some(level) = self.tiles.get_mut(id).and_then(|t| t.draft.as_mut()) else { return };

        if let Some((task_id, stop)) = level.task.as_ref().map(|t| (t.id, Arc::clone(&t.stop))) {
            if self.work.dequeue(task_id) {
                log::trace!("Replacing queued draft pass of {}", id);
                level.task = None;
            } else {
                // running, or finished with the outcome not yet drained
                stop.request_restart();
                return;
            }
        }
        self.submit_pass(id, LevelKind::Draft);
    }

    /// Main levels stop whatever pass they have and start over
    fn enqueue_main(&mut self, id: TileId) {
        self.steps.retain(|s| !s.targets_level(id, LevelKind::Main));
        let Some(level) = self.tiles.get_mut(id).and_then(|t| t.main.as_mut()) else { return };

        if let Some(task) = level.task.take() {
            if !self.work.dequeue(task.id) {
                log::trace!("Stopping running main pass of {}", id);
                task.stop.stop();
                self.stats.passes_abandoned += 1;
            }
        }
        self.submit_pass(id, LevelKind::Main);
    }

    /// Create the pass data and token, prepare on this thread, queue the job
    pub(super) fn submit_pass(&mut self, id: TileId, kind: LevelKind) {
        let Some(tile) = self.tiles.get_mut(id) else { return };
        let coord = tile.coord;
        let distance = tile.distance;
        let is_preview = self.preview == Some(id);
        let Some(level) = tile.level_mut(kind) else { return };

        if let Some(old) = level.pass.take() {
            old.stop();
        }
        level.resuming = None;
        level.generate_ready = false;
        level.apply_ready = false;
        Arc::make_mut(&mut level.edges).ready = false;
        self.board.retract(coord, kind);

        let area = self.settings.area(coord, kind);
        let mut data = level.data.take().unwrap_or_else(|| TileData::new(area, kind.is_draft()));
        data.reset(area, Arc::clone(&self.graph), is_preview);

        let stop = StopToken::new();
        let phase = Arc::new(PhaseCell::default());
        TileEvents::emit_tile(
            &self.events.before_prepare,
            &TileEvent { tile: id, coord, kind, data: &data, stop: Some(&stop) },
        );
        self.graph.prepare(&mut data, level.sink.as_deref());

        self.next_work_id += 1;
        let work_id = self.next_work_id;
        let job = PassJob {
            tile: id,
            coord,
            kind,
            generation: work_id,
            data,
            graph: Arc::clone(&self.graph),
            stop: Arc::clone(&stop),
            phase: Arc::clone(&phase),
            board: self.board.clone(),
            events: Arc::clone(&self.events),
            results: self.results_tx.clone(),
        };

        level.task = Some(PassTask { id: work_id, stop: Arc::clone(&stop), phase });
        level.pass = Some(stop);
        self.stats.passes_submitted += 1;

        log::debug!("Queued {} pass for {} at {}", kind, id, coord);
        self.work.enqueue(WorkItem {
            id: work_id,
            name: format!("{} {}", kind, coord),
            priority: level_priority(distance, kind.is_draft()),
            job: Box::new(move || job.run()),
        });
    }

    /// Stop a level's pass and wait until its job is no longer running
    pub(super) fn cancel_level(&mut self, id: TileId, kind: LevelKind) {
        self.steps.retain(|s| !s.targets_level(id, kind));
        let Some(level) = self.tiles.get_mut(id).and_then(|t| t.level_mut(kind)) else { return };

        if let Some(task) = level.task.take() {
            task.stop.stop();
            task.stop.clear_restart();
            if !self.work.dequeue(task.id) {
                self.work.wait_finished(task.id);
            }
            self.stats.passes_abandoned += 1;
            log::debug!("Stopped {} pass of {}", kind, id);
        }
        if let Some(pass) = level.pass.take() {
            pass.stop();
        }
        level.resuming = None;
    }

    /// Take every finished pass off the results channel
    pub(super) fn drain_results(&mut self) -> usize {
        let mut count = 0;
        while let Ok(outcome) = self.results_rx.try_recv() {
            self.handle_outcome(outcome);
            count += 1;
        }
        count
    }

    fn handle_outcome(&mut self, outcome: JobOutcome) {
        let JobOutcome { tile: id, kind, stop, data, result } = outcome;
        let Some(tile) = self.tiles.get_mut(id) else {
            log::trace!("Result for removed {}", id);
            return;
        };
        let coord = tile.coord;
        let distance = tile.distance;
        let Some(level) = tile.level_mut(kind) else { return };

        let current = level.task.as_ref().is_some_and(|t| Arc::ptr_eq(&t.stop, &stop));
        if !current {
            log::trace!("Discarding superseded {} result of {}", kind, id);
            return;
        }
        level.task = None;

        match stop.state() {
            TokenState::Stopped => {
                level.pass = None;
                self.stats.passes_abandoned += 1;
                return;
            }
            TokenState::Restart => {
                stop.clear_restart();
                level.data = Some(data);
                self.stats.passes_restarted += 1;
                log::debug!("Restarting {} pass of {}", kind, id);
                self.submit_pass(id, kind);
                return;
            }
            TokenState::Live => {}
        }

        let PassResult::Completed { edges, fixups } = result else {
            log::warn!("{} pass of {} cancelled without a stop request", kind, id);
            level.pass = None;
            self.stats.passes_abandoned += 1;
            return;
        };

        let edges = Arc::new(edges);
        level.edges = Arc::clone(&edges);
        level.data = Some(data);
        level.generate_ready = true;
        self.board.publish(coord, kind, edges);
        self.stats.passes_completed += 1;
        log::debug!("Generated {} of {} at {} ({} fixups)", kind, id, coord, fixups.len());

        for fixup in fixups {
            let name = format!("fixup {} {}", fixup.kind, fixup.coord);
            self.steps.push(Step::Fixup(fixup), FIXUP_PRIORITY, name);
        }

        let priority = level_priority(distance, kind.is_draft());
        match kind {
            LevelKind::Draft => {
                self.steps.push(Step::Apply { tile: id, kind, stop }, priority, format!("apply draft {}", coord));
            }
            LevelKind::Main if self.settings.lazy_main_apply => {
                self.steps.push(Step::SwitchLod { tile: id }, priority - 1, format!("switch {}", coord));
            }
            LevelKind::Main => {
                self.steps.push(Step::Apply { tile: id, kind, stop }, priority, format!("apply main {}", coord));
            }
        }
    }
}
