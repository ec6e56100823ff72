//! Switching the visible detail level and welding on the switch

use super::{Step, TerrainSession};
use crate::streaming::{LodChoice, decide_lod, level_priority, main_apply_wanted};
use crate::terrain::detail::LevelKind;
use crate::terrain::events::LodSwitchEvent;
use crate::terrain::tile::TileId;
use crate::terrain::weld::{NeighborEdges, Neighborhood, weld_in_thread};
use std::sync::Arc;

fn shows(choice: LodChoice, kind: LevelKind) -> bool {
    matches!(
        (choice, kind),
        (LodChoice::Main, LevelKind::Main) | (LodChoice::Draft, LevelKind::Draft)
    )
}

impl TerrainSession {
    /// Re-evaluate which level of a tile is visible
    ///
    /// Returns `true` only on an actual change. Calling it again without a
    /// change in readiness or distance touches nothing.
    pub(super) fn switch_lod(&mut self, id: TileId) -> bool {
        let Some(tile) = self.tiles.get(id) else { return false };
        let inputs = tile.lod_inputs();
        if self.settings.lazy_main_apply && main_apply_wanted(&self.policy, &inputs) {
            self.queue_lazy_apply(id);
        }

        let choice = decide_lod(&self.policy, &inputs);
        let Some(tile) = self.tiles.get_mut(id) else { return false };
        if tile.active == choice {
            return false;
        }
        let previous = tile.active;
        let coord = tile.coord;

        for level in tile.levels_mut() {
            if !shows(choice, level.kind()) {
                if let Some(sink) = level.sink.as_mut() {
                    sink.set_active(false);
                }
            }
        }
        for level in tile.levels_mut() {
            if shows(choice, level.kind()) {
                if let Some(sink) = level.sink.as_mut() {
                    sink.set_active(true);
                }
            }
        }
        tile.active = choice;
        tile.objects.set_visible(choice != LodChoice::None);
        self.stats.lod_switches += 1;
        log::debug!("{} at {} switched {:?} -> {:?}", id, coord, previous, choice);

        match choice {
            LodChoice::Main => self.weld_on_switch(id, LevelKind::Main),
            LodChoice::Draft => self.weld_on_switch(id, LevelKind::Draft),
            LodChoice::None => {}
        }

        let event = LodSwitchEvent { tile: id, coord, previous, current: choice };
        self.events.lod_switched.notify_with(|cb| cb(&event));
        true
    }

    /// Queue the deferred main apply once the tile is close enough to show it
    fn queue_lazy_apply(&mut self, id: TileId) {
        let queued = self.steps.any(|s| {
            matches!(s, Step::Apply { tile, kind: LevelKind::Main, .. } if *tile == id)
        });
        if queued {
            return;
        }
        let Some(tile) = self.tiles.get(id) else { return };
        let Some(main) = tile.main() else { return };
        let Some(stop) = main.pass.as_ref().map(Arc::clone) else { return };
        if main.has_task() || main.data().is_none() {
            return;
        }

        log::trace!("Main of {} now wanted, queueing apply", id);
        let priority = level_priority(tile.distance, false);
        let name = format!("apply main {}", tile.coord);
        self.steps.push(Step::Apply { tile: id, kind: LevelKind::Main, stop }, priority, name);
    }

    /// Weld the newly visible level against what the neighbors show
    ///
    /// Fixups are applied right away, to the neighbors and to this level.
    fn weld_on_switch(&mut self, id: TileId, kind: LevelKind) {
        let Some(tile) = self.tiles.get(id) else { return };
        let coord = tile.coord;
        let Some(level) = tile.level(kind) else { return };
        if !level.edges.ready || level.edges.layer_count() == 0 {
            return;
        }

        let mut hood = Neighborhood::new(coord);
        for (offset, neighbor) in self.tiles.neighbors(coord) {
            let shown = match neighbor.active {
                LodChoice::Main => LevelKind::Main,
                LodChoice::Draft => LevelKind::Draft,
                LodChoice::None => continue,
            };
            let Some(other) = neighbor.level(shown) else { continue };
            if !other.edges.ready {
                continue;
            }
            let mut entry = NeighborEdges::default();
            entry.set(shown, Some(Arc::clone(&other.edges)));
            hood.insert(offset, entry);
        }
        if hood.is_empty() {
            return;
        }

        let before = Arc::clone(&level.edges);
        let mut edges = (*before).clone();
        let mut fixups = weld_in_thread(&mut edges, kind, &hood);
        fixups.extend(edges.diff(&before, coord, kind));
        self.stats.switch_welds += 1;
        log::trace!("Switch weld of {} {} produced {} fixups", kind, coord, fixups.len());

        for fixup in &fixups {
            self.apply_fixup(fixup);
        }
    }
}
