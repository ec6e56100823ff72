//! Spatial container of tiles and the shared board of published edges

use super::detail::LevelKind;
use super::tile::{Tile, TileId};
use super::weld::{EdgesSet, NeighborEdges, Neighborhood};
use crate::math::Coord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Tiles keyed by id, indexed by coordinate
#[derive(Debug, Default)]
pub struct TileSet {
    tiles: HashMap<TileId, Tile>,
    by_coord: HashMap<Coord, TileId>,
    next_id: u64,
}

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tile at `coord`. Returns `None` if the coordinate is taken.
    pub(crate) fn insert(&mut self, coord: Coord, distance: f32) -> Option<TileId> {
        if self.by_coord.contains_key(&coord) {
            return None;
        }
        self.next_id += 1;
        let id = TileId(self.next_id);
        self.tiles.insert(id, Tile::new(id, coord, distance));
        self.by_coord.insert(coord, id);
        Some(id)
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(&id)
    }

    pub fn id_at(&self, coord: Coord) -> Option<TileId> {
        self.by_coord.get(&coord).copied()
    }

    pub fn at(&self, coord: Coord) -> Option<&Tile> {
        self.id_at(coord).and_then(|id| self.tiles.get(&id))
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.by_coord.contains_key(&coord)
    }

    /// Move a tile to a free coordinate. Moving onto itself is allowed.
    pub(crate) fn relocate(&mut self, id: TileId, coord: Coord) -> bool {
        if let Some(&other) = self.by_coord.get(&coord) {
            return other == id;
        }
        let Some(tile) = self.tiles.get_mut(&id) else {
            return false;
        };
        self.by_coord.remove(&tile.coord);
        tile.coord = coord;
        self.by_coord.insert(coord, id);
        true
    }

    pub(crate) fn remove(&mut self, id: TileId) -> Option<Tile> {
        let tile = self.tiles.remove(&id)?;
        self.by_coord.remove(&tile.coord);
        Some(tile)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Ids sorted ascending, for deterministic iteration
    pub fn ids(&self) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self.tiles.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Tiles around `coord` (8-connectivity) with their offsets
    pub fn neighbors(&self, coord: Coord) -> impl Iterator<Item = (Coord, &Tile)> + '_ {
        Coord::ZERO
            .neighbors()
            .into_iter()
            .filter_map(move |offset| self.at(coord + offset).map(|t| (offset, t)))
    }

    /// Every coordinate within Chebyshev `range` of `center`, row by row
    pub fn coords_in_range(center: Coord, range: i32) -> impl Iterator<Item = Coord> {
        (-range..=range).flat_map(move |dz| (-range..=range).map(move |dx| center + Coord::new(dx, dz)))
    }
}

/// Edges of generated levels, readable from background jobs
///
/// Written only by the thread driving the session.
#[derive(Clone, Debug, Default)]
pub struct EdgeBoard(Arc<RwLock<HashMap<Coord, NeighborEdges>>>);

impl EdgeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Coord, NeighborEdges>> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Coord, NeighborEdges>> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, coord: Coord, kind: LevelKind, edges: Arc<EdgesSet>) {
        self.write().entry(coord).or_default().set(kind, Some(edges));
    }

    /// Withdraw one level's edges
    pub fn retract(&self, coord: Coord, kind: LevelKind) {
        let mut board = self.write();
        if let Some(entry) = board.get_mut(&coord) {
            entry.set(kind, None);
            if entry.is_empty() {
                board.remove(&coord);
            }
        }
    }

    pub fn remove(&self, coord: Coord) {
        self.write().remove(&coord);
    }

    pub fn get(&self, coord: Coord, kind: LevelKind) -> Option<Arc<EdgesSet>> {
        self.read().get(&coord).and_then(|e| e.get(kind).cloned())
    }

    /// Snapshot of published edges around `coord` for welding `kind`
    ///
    /// The tile's own other level is included at offset zero.
    pub fn neighborhood(&self, coord: Coord, kind: LevelKind) -> Neighborhood {
        let board = self.read();
        let mut hood = Neighborhood::new(coord);
        for offset in Coord::ZERO.neighbors() {
            if let Some(edges) = board.get(&(coord + offset)) {
                hood.insert(offset, edges.clone());
            }
        }
        if let Some(own) = board.get(&coord) {
            let mut other = own.clone();
            other.set(kind, None);
            hood.insert(Coord::ZERO, other);
        }
        hood
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut set = TileSet::new();
        let a = set.insert(Coord::new(0, 0), 0.0).unwrap();
        assert!(set.insert(Coord::new(0, 0), 1.0).is_none());
        let b = set.insert(Coord::new(1, 1), 1.0).unwrap();

        assert_ne!(a, b);
        assert_eq!(set.id_at(Coord::new(1, 1)), Some(b));
        assert_eq!(set.len(), 2);
        assert_eq!(set.ids(), vec![a, b]);
    }

    #[test]
    fn test_relocate() {
        let mut set = TileSet::new();
        let a = set.insert(Coord::new(0, 0), 0.0).unwrap();
        let _b = set.insert(Coord::new(1, 0), 0.0).unwrap();

        assert!(!set.relocate(a, Coord::new(1, 0)));
        assert!(set.relocate(a, Coord::new(0, 0)));
        assert!(set.relocate(a, Coord::new(5, 5)));
        assert!(!set.contains(Coord::new(0, 0)));
        assert_eq!(set.get(a).unwrap().coord(), Coord::new(5, 5));
    }

    #[test]
    fn test_neighbors() {
        let mut set = TileSet::new();
        for coord in TileSet::coords_in_range(Coord::ZERO, 1) {
            set.insert(coord, 0.0);
        }
        assert_eq!(set.len(), 9);
        assert_eq!(set.neighbors(Coord::ZERO).count(), 8);
        assert_eq!(set.neighbors(Coord::new(1, 1)).count(), 3);

        let removed = set.remove(set.id_at(Coord::new(1, 0)).unwrap()).unwrap();
        assert_eq!(removed.coord(), Coord::new(1, 0));
        assert_eq!(set.neighbors(Coord::ZERO).count(), 7);
    }

    #[test]
    fn test_board_neighborhood() {
        let board = EdgeBoard::new();
        let edges = Arc::new(EdgesSet { ready: true, ..Default::default() });
        board.publish(Coord::new(1, 0), LevelKind::Main, Arc::clone(&edges));
        board.publish(Coord::new(0, 0), LevelKind::Main, Arc::clone(&edges));
        board.publish(Coord::new(0, 0), LevelKind::Draft, Arc::clone(&edges));
        board.publish(Coord::new(5, 5), LevelKind::Draft, Arc::clone(&edges));

        let hood = board.neighborhood(Coord::ZERO, LevelKind::Main);
        assert!(hood.get(Coord::new(1, 0)).and_then(|n| n.main.as_ref()).is_some());
        let own = hood.get(Coord::ZERO).unwrap();
        assert!(own.main.is_none() && own.draft.is_some());
        assert!(hood.get(Coord::new(-1, 0)).is_none());

        board.retract(Coord::new(1, 0), LevelKind::Main);
        assert!(board.get(Coord::new(1, 0), LevelKind::Main).is_none());
        assert_eq!(board.len(), 2);
    }
}
