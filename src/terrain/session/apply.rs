//! Cooperative main-thread steps: applying passes and edge fixups

use super::{Step, TerrainSession};
use crate::streaming::{StepStatus, StopToken};
use crate::terrain::apply::ApplyOperation;
use crate::terrain::detail::LevelKind;
use crate::terrain::events::{CompleteEvent, TileEvent, TileEvents};
use crate::terrain::tile::TileId;
use crate::terrain::weld::{EdgeFixup, FixupTarget};
use std::sync::Arc;

impl TerrainSession {
    /// Run the highest priority cooperative step
    ///
    /// Returns `false` if no step was queued.
    pub fn tick(&mut self) -> bool {
        let Some(step) = self.steps.pop() else {
            return false;
        };
        log::trace!("Step {}", step.name);

        let status = match &step.item {
            Step::Apply { tile, kind, stop } => self.run_apply(*tile, *kind, stop),
            Step::SwitchLod { tile } => {
                self.switch_lod(*tile);
                StepStatus::Done
            }
            Step::Fixup(fixup) => {
                self.apply_fixup(fixup);
                StepStatus::Done
            }
        };

        if status == StepStatus::Continue {
            self.steps.requeue(step);
        }
        true
    }

    /// Drain apply operations of one pass
    ///
    /// Drafts drain their whole queue in one step. Main levels run one
    /// operation, or one slice of a resumable operation, per step.
    fn run_apply(&mut self, id: TileId, kind: LevelKind, stop: &Arc<StopToken>) -> StepStatus {
        let Some(level) = self.tiles.get_mut(id).and_then(|t| t.level_mut(kind)) else {
            return StepStatus::Done;
        };
        if !level.owns_pass(stop) {
            log::trace!("Dropping stale {} apply of {}", kind, id);
            return StepStatus::Done;
        }
        let Some(data) = level.data.as_mut() else {
            return StepStatus::Done;
        };
        let sinks = &mut self.sinks;
        let sink = level.sink.get_or_insert_with(|| sinks.create(kind, &data.area)).as_mut();

        let finished = match kind {
            LevelKind::Draft => {
                if let Some(mut op) = level.resuming.take() {
                    while op.step(data, sink) == StepStatus::Continue {}
                }
                while let Some(op) = data.pop_apply() {
                    op.run_to_completion(data, sink);
                }
                true
            }
            LevelKind::Main => {
                let resumed = level.resuming.as_mut().map(|op| op.step(data, sink));
                match resumed {
                    Some(StepStatus::Done) => level.resuming = None,
                    Some(StepStatus::Continue) => {}
                    None => match data.pop_apply() {
                        Some(ApplyOperation::Immediate(f)) => f(data, sink),
                        Some(ApplyOperation::Resumable(mut op)) => {
                            if op.step(data, sink) == StepStatus::Continue {
                                level.resuming = Some(op);
                            }
                        }
                        None => {}
                    },
                }
                level.resuming.is_none() && data.pending_apply() == 0
            }
        };

        if finished {
            self.finish_apply(id, kind);
            StepStatus::Done
        } else {
            StepStatus::Continue
        }
    }

    /// Mark applied, switch LOD, then notify
    fn finish_apply(&mut self, id: TileId, kind: LevelKind) {
        let Some(tile) = self.tiles.get_mut(id) else { return };
        let coord = tile.coord;
        let Some(level) = tile.level_mut(kind) else { return };
        level.apply_ready = true;
        level.pass = None;
        if kind == LevelKind::Main {
            if let Some(data) = tile.main.as_ref().and_then(|l| l.data.as_ref()) {
                tile.objects.replace(&data.products.objects);
            }
        }
        self.stats.applies_finished += 1;
        log::debug!("Applied {} of {} at {}", kind, id, coord);

        // ready before the switch so switch observers see a consistent state
        self.switch_lod(id);

        let events = Arc::clone(&self.events);
        if let Some(data) = self.tiles.get(id).and_then(|t| t.level(kind)).and_then(|l| l.data()) {
            let event = TileEvent { tile: id, coord, kind, data, stop: None };
            TileEvents::emit_tile(&events.tile_applied, &event);
        }

        self.notify_if_complete();
    }

    pub(super) fn notify_if_complete(&mut self) {
        if self.is_working() {
            return;
        }
        log::info!("All {} tiles complete", self.tiles.len());
        let event = CompleteEvent { tiles: self.tiles.len() };
        self.events.all_complete.notify_with(|cb| cb(&event));
    }

    /// Write a welding result into another level's edges, pending grids and sink
    ///
    /// Skipped when the target has produced new edges since the fixup was computed.
    pub(super) fn apply_fixup(&mut self, fixup: &EdgeFixup) {
        let Some(id) = self.tiles.id_at(fixup.coord) else { return };
        let Some(level) = self.tiles.get_mut(id).and_then(|t| t.level_mut(fixup.kind)) else { return };

        if level.edges.generation != fixup.generation {
            self.stats.fixups_stale += 1;
            log::trace!("Skipping stale fixup for {} {}", fixup.kind, fixup.coord);
            return;
        }

        fixup.apply_to_edges(Arc::make_mut(&mut level.edges));
        if level.edges.ready {
            self.board.publish(fixup.coord, fixup.kind, Arc::clone(&level.edges));
        }
        if let Some(data) = level.data.as_mut() {
            fixup.apply_to_data(data);
        }
        if let Some(sink) = level.sink.as_mut() {
            match &fixup.target {
                FixupTarget::Side(side, values) => sink.write_edge(fixup.layer, *side, values),
                FixupTarget::Corner(corner, value) => sink.write_corner(fixup.layer, *corner, *value),
            }
        }
        self.stats.fixups_applied += 1;
    }
}
