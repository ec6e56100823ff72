//! Edge welding between adjacent tiles
//!
//! After generation each detail level extracts its border samples into an
//! [`EdgesSet`]: four side lines and four corner values per layer, taken from
//! the active rect. Adjacent tiles share their border pixels, so a side of
//! one tile and the opposite side of its neighbor describe the same line.
//!
//! Reconciliation rules:
//! * main-resolution values win over draft-resolution values
//! * two values of the same class are averaged
//! * a corner is shared by four tiles; the main class wins if any of the
//!   participants has a main level, and every participant receives the
//!   average of the winning class
//!
//! Corners average the values each level generated, not the values left by
//! earlier welds, so the shared corner does not depend on which tile
//! finished first.
//!
//! [`weld_in_thread`] only touches the edges of the pass being generated.
//! Changes the neighbors need are returned as [`EdgeFixup`]s and applied on
//! the thread that owns the sinks.

use super::detail::LevelKind;
use super::tile_data::TileData;
use crate::math::{Coord, CoordRect};
use crate::matrix::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const WELD_EPSILON: f32 = 1e-6;

/// Border line of a tile
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Bottom, Side::Top];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Bottom => Side::Top,
            Side::Top => Side::Bottom,
        }
    }

    /// Offset of the tile across this side
    pub fn offset(self) -> Coord {
        match self {
            Side::Left => Coord::new(-1, 0),
            Side::Right => Coord::new(1, 0),
            Side::Bottom => Coord::new(0, -1),
            Side::Top => Coord::new(0, 1),
        }
    }

    /// One-pixel line of `rect` along this side. Left and right run along
    /// z, bottom and top along x.
    pub fn strip(self, rect: CoordRect) -> CoordRect {
        let (min, max) = (rect.min(), rect.max());
        match self {
            Side::Left => CoordRect::from_xz(min.x, min.z, 1, rect.size.z),
            Side::Right => CoordRect::from_xz(max.x - 1, min.z, 1, rect.size.z),
            Side::Bottom => CoordRect::from_xz(min.x, min.z, rect.size.x, 1),
            Side::Top => CoordRect::from_xz(min.x, max.z - 1, rect.size.x, 1),
        }
    }
}

/// Corner of a tile
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub enum Corner {
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::BottomLeft, Corner::BottomRight, Corner::TopLeft, Corner::TopRight];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Diagonal direction pointing out of the tile
    pub fn direction(self) -> Coord {
        match self {
            Corner::BottomLeft => Coord::new(-1, -1),
            Corner::BottomRight => Coord::new(1, -1),
            Corner::TopLeft => Coord::new(-1, 1),
            Corner::TopRight => Coord::new(1, 1),
        }
    }

    fn from_direction(dir: Coord) -> Corner {
        match (dir.x < 0, dir.z < 0) {
            (true, true) => Corner::BottomLeft,
            (false, true) => Corner::BottomRight,
            (true, false) => Corner::TopLeft,
            (false, false) => Corner::TopRight,
        }
    }

    pub fn pixel(self, rect: CoordRect) -> Coord {
        let (min, max) = (rect.min(), rect.max());
        match self {
            Corner::BottomLeft => Coord::new(min.x, min.z),
            Corner::BottomRight => Coord::new(max.x - 1, min.z),
            Corner::TopLeft => Coord::new(min.x, max.z - 1),
            Corner::TopRight => Coord::new(max.x - 1, max.z - 1),
        }
    }

    /// The three other tiles sharing this corner: their offset and which of
    /// their corners coincides with ours
    pub fn participants(self) -> [(Coord, Corner); 3] {
        let d = self.direction();
        let flip = |o: Coord| {
            let dir = Coord::new(if o.x != 0 { -d.x } else { d.x }, if o.z != 0 { -d.z } else { d.z });
            (o, Corner::from_direction(dir))
        };
        [flip(Coord::new(d.x, 0)), flip(Coord::new(0, d.z)), flip(d)]
    }

    /// Sides ending at this corner, with `true` when the corner is the last
    /// sample of the side line
    fn sides(self) -> [(Side, bool); 2] {
        match self {
            Corner::BottomLeft => [(Side::Left, false), (Side::Bottom, false)],
            Corner::BottomRight => [(Side::Right, false), (Side::Bottom, true)],
            Corner::TopLeft => [(Side::Left, true), (Side::Top, false)],
            Corner::TopRight => [(Side::Right, true), (Side::Top, true)],
        }
    }
}

/// Border samples of one layer
#[derive(
    Clone, Debug, Default, PartialEq,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct Edges {
    pub sides: [Vec<f32>; 4],
    pub corners: [f32; 4],
    /// Corner samples as extracted; welding never changes these
    pub generated: [f32; 4],
}

impl Edges {
    pub fn side(&self, side: Side) -> &[f32] {
        &self.sides[side.index()]
    }

    pub fn corner(&self, corner: Corner) -> f32 {
        self.corners[corner.index()]
    }

    pub fn generated_corner(&self, corner: Corner) -> f32 {
        self.generated[corner.index()]
    }

    /// Replace a side line; corners at its ends follow
    pub fn set_side(&mut self, side: Side, values: Vec<f32>) {
        if let (Some(&first), Some(&last)) = (values.first(), values.last()) {
            for corner in Corner::ALL {
                for (s, at_end) in corner.sides() {
                    if s == side {
                        self.corners[corner.index()] = if at_end { last } else { first };
                    }
                }
            }
        }
        self.sides[side.index()] = values;
    }

    /// Replace a corner value; side line ends follow
    pub fn set_corner(&mut self, corner: Corner, value: f32) {
        self.corners[corner.index()] = value;
        for (side, at_end) in corner.sides() {
            let line = &mut self.sides[side.index()];
            let slot = if at_end { line.last_mut() } else { line.first_mut() };
            if let Some(v) = slot {
                *v = value;
            }
        }
    }
}

/// Cached border samples of a detail level
///
/// Layer 0 holds heights, further layers splat channels. Survives across
/// passes and sessions so neighbors can weld against it without reading
/// full grids.
#[derive(
    Clone, Debug, Default, PartialEq,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct EdgesSet {
    pub layers: Vec<Edges>,
    /// Extracted from a completed pass
    pub ready: bool,
    /// Identifier of the pass that produced these edges
    pub generation: u64,
}

impl EdgesSet {
    /// Extract border samples from the active rect of every product layer
    pub fn read(data: &TileData, generation: u64) -> EdgesSet {
        let active = data.area.active();
        let mut layers = Vec::with_capacity(data.products.layer_count());

        for layer in 0..data.products.layer_count() {
            let Some(grid) = data.products.layer(layer) else { break };
            if grid.rect().intersect(&active) != active {
                log::warn!("Layer {} of {:?} does not cover the active rect", layer, data.area.coord);
                break;
            }
            let mut edges = Edges::default();
            for side in Side::ALL {
                let line: Vec<f32> = side.strip(active).cells().map(|c| grid.get(c.x, c.z)).collect();
                edges.sides[side.index()] = line;
            }
            for corner in Corner::ALL {
                let p = corner.pixel(active);
                edges.corners[corner.index()] = grid.get(p.x, p.z);
            }
            edges.generated = edges.corners;
            layers.push(edges);
        }

        EdgesSet { layers, ready: true, generation }
    }

    /// Write border samples back into the product grids, sides then corners
    pub fn write(&self, data: &mut TileData) {
        let active = data.area.active();
        for (layer, edges) in self.layers.iter().enumerate() {
            let Some(grid) = data.products.layer_mut(layer) else { break };
            for side in Side::ALL {
                write_line(grid, side.strip(active), edges.side(side));
            }
            for corner in Corner::ALL {
                let p = corner.pixel(active);
                if grid.rect().contains(p) {
                    grid.set(p.x, p.z, edges.corner(corner));
                }
            }
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Fixups describing every side or corner of `self` that differs from `before`
    pub fn diff(&self, before: &EdgesSet, coord: Coord, kind: LevelKind) -> Vec<EdgeFixup> {
        let mut fixups = Vec::new();
        for (layer, (now, was)) in self.layers.iter().zip(&before.layers).enumerate() {
            for side in Side::ALL {
                if !lines_equal(now.side(side), was.side(side)) {
                    fixups.push(EdgeFixup {
                        coord,
                        kind,
                        generation: self.generation,
                        layer,
                        target: FixupTarget::Side(side, now.side(side).to_vec()),
                    });
                }
            }
            for corner in Corner::ALL {
                if (now.corner(corner) - was.corner(corner)).abs() > WELD_EPSILON {
                    fixups.push(EdgeFixup {
                        coord,
                        kind,
                        generation: self.generation,
                        layer,
                        target: FixupTarget::Corner(corner, now.corner(corner)),
                    });
                }
            }
        }
        fixups
    }
}

/// Write `values` along a one-pixel line, clipped to the grid
pub(crate) fn write_line(grid: &mut Matrix, strip: CoordRect, values: &[f32]) {
    for (cell, &v) in strip.cells().zip(values) {
        if grid.rect().contains(cell) {
            grid.set(cell.x, cell.z, v);
        }
    }
}

fn lines_equal(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= WELD_EPSILON)
}

/// Linear resample of a border line, first and last samples aligned
pub fn resample_line(src: &[f32], len: usize) -> Vec<f32> {
    if src.len() == len {
        return src.to_vec();
    }
    match (src.len(), len) {
        (_, 0) | (0, _) => Vec::new(),
        (1, _) => vec![src[0]; len],
        (_, 1) => vec![src[0]],
        _ => {
            let scale = (src.len() - 1) as f32 / (len - 1) as f32;
            (0..len)
                .map(|i| {
                    let pos = i as f32 * scale;
                    let i0 = (pos.floor() as usize).min(src.len() - 1);
                    let i1 = (i0 + 1).min(src.len() - 1);
                    let t = pos - i0 as f32;
                    src[i0] + (src[i1] - src[i0]) * t
                })
                .collect()
        }
    }
}

/// Published edges of one neighboring tile
#[derive(Clone, Debug, Default)]
pub struct NeighborEdges {
    pub main: Option<Arc<EdgesSet>>,
    pub draft: Option<Arc<EdgesSet>>,
}

impl NeighborEdges {
    pub fn get(&self, kind: LevelKind) -> Option<&Arc<EdgesSet>> {
        match kind {
            LevelKind::Main => self.main.as_ref(),
            LevelKind::Draft => self.draft.as_ref(),
        }
    }

    pub fn set(&mut self, kind: LevelKind, edges: Option<Arc<EdgesSet>>) {
        match kind {
            LevelKind::Main => self.main = edges,
            LevelKind::Draft => self.draft = edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.draft.is_none()
    }

    fn levels(&self) -> impl Iterator<Item = (LevelKind, &Arc<EdgesSet>)> {
        self.main.iter().map(|e| (LevelKind::Main, e))
            .chain(self.draft.iter().map(|e| (LevelKind::Draft, e)))
    }
}

/// Edges around one tile, keyed by offset from it
///
/// Offset `(0, 0)` holds the tile's own other detail level, which shares
/// every border with the level being welded.
#[derive(Clone, Debug, Default)]
pub struct Neighborhood {
    center: Coord,
    cells: HashMap<Coord, NeighborEdges>,
}

impl Neighborhood {
    pub fn new(center: Coord) -> Self {
        Self { center, cells: HashMap::new() }
    }

    pub fn center(&self) -> Coord {
        self.center
    }

    pub fn insert(&mut self, offset: Coord, edges: NeighborEdges) {
        if !edges.is_empty() {
            self.cells.insert(offset, edges);
        }
    }

    pub fn get(&self, offset: Coord) -> Option<&NeighborEdges> {
        self.cells.get(&offset)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Change to a border owned by another level
#[derive(Clone, Debug, PartialEq)]
pub enum FixupTarget {
    Side(Side, Vec<f32>),
    Corner(Corner, f32),
}

/// Welding result destined for a level other than the one being welded
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeFixup {
    /// Tile coordinate of the target level
    pub coord: Coord,
    pub kind: LevelKind,
    /// Edges generation the fixup was computed against
    pub generation: u64,
    pub layer: usize,
    pub target: FixupTarget,
}

impl EdgeFixup {
    /// Write the fixup into cached edges
    pub fn apply_to_edges(&self, edges: &mut EdgesSet) {
        let Some(layer) = edges.layers.get_mut(self.layer) else { return };
        match &self.target {
            FixupTarget::Side(side, values) => layer.set_side(*side, values.clone()),
            FixupTarget::Corner(corner, value) => layer.set_corner(*corner, *value),
        }
    }

    /// Write the fixup into product grids
    pub fn apply_to_data(&self, data: &mut TileData) {
        let active = data.area.active();
        let Some(grid) = data.products.layer_mut(self.layer) else { return };
        match &self.target {
            FixupTarget::Side(side, values) => write_line(grid, side.strip(active), values),
            FixupTarget::Corner(corner, value) => {
                let p = corner.pixel(active);
                if grid.rect().contains(p) {
                    grid.set(p.x, p.z, *value);
                }
            }
        }
    }
}

fn side_fixup(coord: Coord, kind: LevelKind, target: &EdgesSet, layer: usize, side: Side, values: &[f32]) -> Option<EdgeFixup> {
    let current = target.layers.get(layer)?.side(side);
    if current.is_empty() {
        return None;
    }
    let resampled = resample_line(values, current.len());
    (!lines_equal(current, &resampled)).then(|| EdgeFixup {
        coord,
        kind,
        generation: target.generation,
        layer,
        target: FixupTarget::Side(side, resampled),
    })
}

/// Corner value of a level once the fixups already queued for it are applied
fn pending_corner(fixups: &[EdgeFixup], coord: Coord, kind: LevelKind, target: &EdgesSet, layer: usize, corner: Corner) -> Option<f32> {
    let mut value = target.layers.get(layer)?.corner(corner);
    for f in fixups.iter().filter(|f| f.coord == coord && f.kind == kind && f.layer == layer) {
        match &f.target {
            FixupTarget::Corner(c, v) if *c == corner => value = *v,
            FixupTarget::Side(side, line) => {
                for (s, at_end) in corner.sides() {
                    if s == *side {
                        let end = if at_end { line.last() } else { line.first() };
                        value = end.copied().unwrap_or(value);
                    }
                }
            }
            _ => {}
        }
    }
    Some(value)
}

fn corner_fixup(fixups: &[EdgeFixup], coord: Coord, kind: LevelKind, target: &EdgesSet, layer: usize, corner: Corner, value: f32) -> Option<EdgeFixup> {
    let current = pending_corner(fixups, coord, kind, target, layer, corner)?;
    ((current - value).abs() > WELD_EPSILON).then(|| EdgeFixup {
        coord,
        kind,
        generation: target.generation,
        layer,
        target: FixupTarget::Corner(corner, value),
    })
}

fn layer_side<'a>(edges: &'a EdgesSet, layer: usize, side: Side) -> Option<&'a [f32]> {
    edges.layers.get(layer).map(|e| e.side(side)).filter(|s| !s.is_empty())
}

/// Reconcile freshly read edges with the published edges around the tile
///
/// Pure data transform, safe on a worker thread. `edges` is updated in
/// place; changes needed by other levels come back as fixups.
pub fn weld_in_thread(edges: &mut EdgesSet, kind: LevelKind, hood: &Neighborhood) -> Vec<EdgeFixup> {
    let mut fixups = Vec::new();
    if hood.is_empty() {
        return fixups;
    }
    let center = hood.center();
    let own_other = hood.get(Coord::ZERO);
    let layer_count = edges.layers.len();

    for side in Side::ALL {
        let Some(across) = hood.get(side.offset()) else { continue };
        let neighbor = center + side.offset();
        let opposite = side.opposite();

        for layer in 0..layer_count {
            let ours = edges.layers[layer].side(side).to_vec();
            if ours.is_empty() {
                continue;
            }
            let their_main = across.main.as_ref().and_then(|e| layer_side(e, layer, opposite));
            let their_draft = across.draft.as_ref().and_then(|e| layer_side(e, layer, opposite));

            let welded = match kind {
                LevelKind::Main => match their_main {
                    Some(theirs) => average(&ours, &resample_line(theirs, ours.len())),
                    None => ours.clone(),
                },
                LevelKind::Draft => {
                    let own_main = own_other
                        .and_then(|o| o.main.as_ref())
                        .and_then(|e| layer_side(e, layer, side));
                    match (their_main, own_main, their_draft) {
                        (Some(theirs), _, _) => resample_line(theirs, ours.len()),
                        (None, Some(main), _) => resample_line(main, ours.len()),
                        (None, None, Some(theirs)) => average(&ours, &resample_line(theirs, ours.len())),
                        (None, None, None) => ours.clone(),
                    }
                }
            };

            // main-class neighbors only follow a main weld
            if kind == LevelKind::Main {
                if let Some(target) = &across.main {
                    fixups.extend(side_fixup(neighbor, LevelKind::Main, target, layer, opposite, &welded));
                }
            }
            if let Some(target) = &across.draft {
                fixups.extend(side_fixup(neighbor, LevelKind::Draft, target, layer, opposite, &welded));
            }
            if kind == LevelKind::Main {
                if let Some(target) = own_other.and_then(|o| o.draft.as_ref()) {
                    fixups.extend(side_fixup(center, LevelKind::Draft, target, layer, side, &welded));
                }
            }
            edges.layers[layer].set_side(side, welded);
        }
    }

    for corner in Corner::ALL {
        for layer in 0..layer_count {
            weld_corner(edges, kind, hood, corner, layer, &mut fixups);
        }
    }

    fixups
}

fn weld_corner(edges: &mut EdgesSet, kind: LevelKind, hood: &Neighborhood, corner: Corner, layer: usize, fixups: &mut Vec<EdgeFixup>) {
    let center = hood.center();
    // (tile coord, kind, corner, edges) of every other level sharing this pixel
    let mut others: Vec<(Coord, LevelKind, Corner, &Arc<EdgesSet>)> = Vec::new();
    if let Some(own) = hood.get(Coord::ZERO) {
        others.extend(own.levels().filter(|(k, _)| *k != kind).map(|(k, e)| (center, k, corner, e)));
    }
    for (offset, their_corner) in corner.participants() {
        if let Some(n) = hood.get(offset) {
            others.extend(n.levels().map(|(k, e)| (center + offset, k, their_corner, e)));
        }
    }
    others.retain(|(_, _, _, e)| e.layers.get(layer).is_some());
    if others.is_empty() {
        return;
    }

    let own_value = edges.layers[layer].generated_corner(corner);
    let any_main = kind == LevelKind::Main || others.iter().any(|(_, k, _, _)| *k == LevelKind::Main);
    let winner = if any_main { LevelKind::Main } else { LevelKind::Draft };

    let mut sum = 0.0;
    let mut count = 0;
    if kind == winner {
        sum += own_value;
        count += 1;
    }
    for (_, k, c, e) in &others {
        if *k == winner {
            sum += e.layers[layer].generated_corner(*c);
            count += 1;
        }
    }
    if count == 0 {
        return;
    }
    let value = sum / count as f32;

    edges.layers[layer].set_corner(corner, value);
    for (coord, k, c, e) in others {
        if let Some(fix) = corner_fixup(fixups, coord, k, e, layer, c, value) {
            fixups.push(fix);
        }
    }
}

fn average(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| (x + y) * 0.5).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::area::Area;

    fn edges_with(value: f32, len: usize) -> EdgesSet {
        let mut layer = Edges::default();
        for side in Side::ALL {
            layer.sides[side.index()] = vec![value; len];
        }
        layer.corners = [value; 4];
        layer.generated = [value; 4];
        EdgesSet { layers: vec![layer], ready: true, generation: 1 }
    }

    fn hood_with(center: Coord, offset: Coord, main: Option<EdgesSet>, draft: Option<EdgesSet>) -> Neighborhood {
        let mut hood = Neighborhood::new(center);
        hood.insert(offset, NeighborEdges { main: main.map(Arc::new), draft: draft.map(Arc::new) });
        hood
    }

    #[test]
    fn test_corner_participants() {
        let p = Corner::TopRight.participants();
        assert_eq!(p[0], (Coord::new(1, 0), Corner::TopLeft));
        assert_eq!(p[1], (Coord::new(0, 1), Corner::BottomRight));
        assert_eq!(p[2], (Coord::new(1, 1), Corner::BottomLeft));
    }

    #[test]
    fn test_strips_and_pixels() {
        let rect = CoordRect::from_xz(8, 16, 9, 9);
        assert_eq!(Side::Right.strip(rect), CoordRect::from_xz(16, 16, 1, 9));
        assert_eq!(Side::Top.strip(rect), CoordRect::from_xz(8, 24, 9, 1));
        assert_eq!(Corner::TopRight.pixel(rect), Coord::new(16, 24));
    }

    #[test]
    fn test_resample_line() {
        assert_eq!(resample_line(&[0.0, 1.0], 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(resample_line(&[0.0, 0.5, 1.0, 0.5, 0.0], 3), vec![0.0, 1.0, 0.0]);
        assert!(resample_line(&[], 3).is_empty());
    }

    #[test]
    fn test_read_write_roundtrip() {
        let area = Area::new(Coord::new(1, 0), 100.0, 5, 1);
        let mut data = TileData::new(area, false);
        let mut grid = Matrix::new(area.full());
        for c in area.full().cells() {
            grid.set(c.x, c.z, (c.x * 100 + c.z) as f32);
        }
        data.products.height = Some(grid);

        let mut edges = EdgesSet::read(&data, 7);
        assert_eq!(edges.generation, 7);
        assert_eq!(edges.layers[0].side(Side::Left), &[400.0, 401.0, 402.0, 403.0, 404.0]);
        assert_eq!(edges.layers[0].corner(Corner::TopRight), 804.0);

        edges.layers[0].set_side(Side::Left, vec![0.0; 5]);
        edges.write(&mut data);
        let grid = data.products.height.as_ref().unwrap();
        assert_eq!(grid.get(4, 2), 0.0);
        assert_eq!(grid.get(5, 2), 502.0);
        assert_eq!(grid.get(3, 2), 302.0);
    }

    #[test]
    fn test_set_side_updates_corners() {
        let mut e = edges_with(0.0, 3).layers.remove(0);
        e.set_side(Side::Top, vec![1.0, 2.0, 3.0]);
        assert_eq!(e.corner(Corner::TopLeft), 1.0);
        assert_eq!(e.corner(Corner::TopRight), 3.0);

        e.set_corner(Corner::BottomRight, 9.0);
        assert_eq!(e.side(Side::Right)[0], 9.0);
        assert_eq!(*e.side(Side::Bottom).last().unwrap(), 9.0);
    }

    #[test]
    fn test_main_main_averages() {
        let center = Coord::new(0, 0);
        let mut ours = edges_with(0.0, 5);
        let hood = hood_with(center, Side::Right.offset(), Some(edges_with(1.0, 5)), None);

        let fixups = weld_in_thread(&mut ours, LevelKind::Main, &hood);
        assert_eq!(ours.layers[0].side(Side::Right)[2], 0.5);

        let side_fix = fixups
            .iter()
            .find(|f| matches!(f.target, FixupTarget::Side(Side::Left, _)))
            .unwrap();
        assert_eq!(side_fix.coord, Coord::new(1, 0));
        assert_eq!(side_fix.kind, LevelKind::Main);
        assert_eq!(side_fix.target, FixupTarget::Side(Side::Left, vec![0.5; 5]));
    }

    #[test]
    fn test_draft_snaps_to_main_neighbor() {
        let center = Coord::new(0, 0);
        let mut ours = edges_with(0.0, 3);
        let hood = hood_with(center, Side::Top.offset(), Some(edges_with(1.0, 9)), Some(edges_with(0.2, 3)));

        let fixups = weld_in_thread(&mut ours, LevelKind::Draft, &hood);
        assert_eq!(ours.layers[0].side(Side::Top), &[1.0, 1.0, 1.0]);
        assert!(fixups.iter().all(|f| f.kind == LevelKind::Draft));
        assert!(fixups.iter().any(|f| f.target == FixupTarget::Side(Side::Bottom, vec![1.0; 3])));
    }

    #[test]
    fn test_main_pushes_to_neighbor_draft() {
        let center = Coord::new(0, 0);
        let mut ours = edges_with(0.8, 9);
        let hood = hood_with(center, Side::Left.offset(), None, Some(edges_with(0.0, 3)));

        let fixups = weld_in_thread(&mut ours, LevelKind::Main, &hood);
        assert_eq!(ours.layers[0].side(Side::Left), &[0.8; 9]);
        assert!(fixups.iter().any(|f| f.coord == Coord::new(-1, 0)
            && f.kind == LevelKind::Draft
            && f.target == FixupTarget::Side(Side::Right, vec![0.8; 3])));
    }

    #[test]
    fn test_draft_drafts_average() {
        let mut ours = edges_with(0.0, 3);
        let hood = hood_with(Coord::ZERO, Side::Bottom.offset(), None, Some(edges_with(1.0, 3)));
        weld_in_thread(&mut ours, LevelKind::Draft, &hood);
        assert_eq!(ours.layers[0].side(Side::Bottom)[1], 0.5);
    }

    #[test]
    fn test_corner_main_class_wins() {
        let center = Coord::new(0, 0);
        let mut ours = edges_with(0.0, 3);
        let mut hood = Neighborhood::new(center);
        // right: draft only, top: main 1.0, diagonal: main 0.5
        hood.insert(Coord::new(1, 0), NeighborEdges { main: None, draft: Some(Arc::new(edges_with(0.9, 3))) });
        hood.insert(Coord::new(0, 1), NeighborEdges { main: Some(Arc::new(edges_with(1.0, 3))), draft: None });
        hood.insert(Coord::new(1, 1), NeighborEdges { main: Some(Arc::new(edges_with(0.5, 3))), draft: None });

        let fixups = weld_in_thread(&mut ours, LevelKind::Draft, &hood);
        assert_eq!(ours.layers[0].corner(Corner::TopRight), 0.75);

        let corner_fixes: Vec<_> = fixups
            .iter()
            .filter(|f| matches!(f.target, FixupTarget::Corner(_, v) if v == 0.75))
            .map(|f| (f.coord, f.kind))
            .collect();
        assert!(corner_fixes.contains(&(Coord::new(1, 0), LevelKind::Draft)));
        assert!(corner_fixes.contains(&(Coord::new(0, 1), LevelKind::Main)));
        assert!(corner_fixes.contains(&(Coord::new(1, 1), LevelKind::Main)));
    }

    /// Weld mains one by one at the given coords, applying fixups to the
    /// already placed tiles the way the session does
    fn weld_in_order(tiles: &[(Coord, f32)]) -> HashMap<Coord, EdgesSet> {
        let mut placed: HashMap<Coord, EdgesSet> = HashMap::new();
        for &(coord, value) in tiles {
            let mut ours = edges_with(value, 3);
            let mut hood = Neighborhood::new(coord);
            for (other, edges) in &placed {
                let offset = *other - coord;
                if offset.x.abs() <= 1 && offset.z.abs() <= 1 {
                    hood.insert(offset, NeighborEdges { main: Some(Arc::new(edges.clone())), draft: None });
                }
            }
            for f in weld_in_thread(&mut ours, LevelKind::Main, &hood) {
                if let Some(target) = placed.get_mut(&f.coord) {
                    f.apply_to_edges(target);
                }
            }
            placed.insert(coord, ours);
        }
        placed
    }

    #[test]
    fn test_corner_independent_of_arrival_order() {
        let tiles = [
            (Coord::new(0, 0), 0.1),
            (Coord::new(1, 0), 0.3),
            (Coord::new(0, 1), 0.5),
            (Coord::new(1, 1), 0.7),
        ];
        let mut reversed = tiles;
        reversed.reverse();

        for order in [tiles, reversed] {
            let placed = weld_in_order(&order);
            let shared = [
                (Coord::new(0, 0), Corner::TopRight),
                (Coord::new(1, 0), Corner::TopLeft),
                (Coord::new(0, 1), Corner::BottomRight),
                (Coord::new(1, 1), Corner::BottomLeft),
            ];
            for (coord, corner) in shared {
                let value = placed[&coord].layers[0].corner(corner);
                assert!((value - 0.4).abs() < 1e-5, "{} {:?} = {}", coord, corner, value);
            }
        }
    }

    #[test]
    fn test_no_neighbors_no_change() {
        let mut ours = edges_with(0.3, 3);
        let before = ours.clone();
        let fixups = weld_in_thread(&mut ours, LevelKind::Main, &Neighborhood::new(Coord::ZERO));
        assert!(fixups.is_empty());
        assert_eq!(ours, before);
        assert!(ours.diff(&before, Coord::ZERO, LevelKind::Main).is_empty());
    }

    #[test]
    fn test_diff_and_apply_fixup() {
        let before = edges_with(0.0, 3);
        let mut after = before.clone();
        after.layers[0].set_corner(Corner::BottomLeft, 1.0);

        let fixups = after.diff(&before, Coord::new(4, 4), LevelKind::Draft);
        let mut target = before.clone();
        for f in &fixups {
            f.apply_to_edges(&mut target);
        }
        assert_eq!(target, after);
    }
}
