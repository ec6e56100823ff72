//! Terrain sinks: where applied data ends up

use super::area::Area;
use super::detail::LevelKind;
use super::weld::{Corner, Side};
use crate::math::{Coord, CoordRect};
use crate::matrix::Matrix;
use std::sync::{Arc, Mutex, MutexGuard};

/// A live terrain object receiving apply operations
///
/// Sinks are only ever touched from the thread driving the session, never
/// from background jobs. Writes address absolute pixels; anything outside
/// [`TerrainSink::rect`] is ignored.
pub trait TerrainSink: Send {
    /// Pixels this sink displays
    fn rect(&self) -> CoordRect;

    fn set_active(&mut self, active: bool);

    fn is_active(&self) -> bool;

    fn set_heights(&mut self, values: &Matrix);

    fn set_splats(&mut self, channel: usize, values: &Matrix);

    /// Layer 0 is heights, layer `i >= 1` is splat channel `i - 1`
    fn set_layer(&mut self, layer: usize, values: &Matrix) {
        match layer {
            0 => self.set_heights(values),
            i => self.set_splats(i - 1, values),
        }
    }

    /// Overwrite one border line of a layer
    fn write_edge(&mut self, layer: usize, side: Side, values: &[f32]) {
        let strip = side.strip(self.rect());
        if let Ok(line) = Matrix::from_vec(strip, values.to_vec()) {
            self.set_layer(layer, &line);
        }
    }

    fn write_corner(&mut self, layer: usize, corner: Corner, value: f32) {
        let cell = CoordRect::square(corner.pixel(self.rect()), 1);
        self.set_layer(layer, &Matrix::filled(cell, value));
    }

    /// Current heights, when the sink can read them back
    fn heights(&self) -> Option<&Matrix> {
        None
    }
}

/// Creates sinks lazily, the first time a level applies
pub trait SinkFactory: Send {
    fn create(&mut self, kind: LevelKind, area: &Area) -> Box<dyn TerrainSink>;
}

/// What happened to a sink
#[derive(Clone, Debug, PartialEq)]
pub enum SinkOp {
    Activate,
    Deactivate,
    Heights(CoordRect),
    Splats { channel: usize, rect: CoordRect },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SinkEvent {
    /// Label of the sink, `"<coord> <kind>"`
    pub sink: String,
    pub op: SinkOp,
}

/// Shared, ordered record of sink mutations
#[derive(Clone, Debug, Default)]
pub struct SinkJournal(Arc<Mutex<Vec<SinkEvent>>>);

impl SinkJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, sink: &str, op: SinkOp) {
        self.lock().push(SinkEvent { sink: sink.to_string(), op });
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Events of one sink, in order
    pub fn events_of(&self, sink: &str) -> Vec<SinkOp> {
        self.lock().iter().filter(|e| e.sink == sink).map(|e| e.op.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// In-memory terrain: a height grid, splat grids and an activity flag
#[derive(Debug)]
pub struct MemorySink {
    label: String,
    active: bool,
    heights: Matrix,
    splats: Vec<Matrix>,
    journal: Option<SinkJournal>,
}

impl MemorySink {
    pub fn new(label: impl Into<String>, rect: CoordRect) -> Self {
        Self {
            label: label.into(),
            active: false,
            heights: Matrix::new(rect),
            splats: Vec::new(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: SinkJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn splats(&self) -> &[Matrix] {
        &self.splats
    }

    fn record(&self, op: SinkOp) {
        if let Some(journal) = &self.journal {
            journal.record(&self.label, op);
        }
    }
}

impl TerrainSink for MemorySink {
    fn rect(&self) -> CoordRect {
        self.heights.rect()
    }

    fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.record(if active { SinkOp::Activate } else { SinkOp::Deactivate });
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_heights(&mut self, values: &Matrix) {
        self.heights.read_from(values);
        self.record(SinkOp::Heights(values.rect().intersect(&self.heights.rect())));
    }

    fn set_splats(&mut self, channel: usize, values: &Matrix) {
        let rect = self.heights.rect();
        while self.splats.len() <= channel {
            self.splats.push(Matrix::new(rect));
        }
        self.splats[channel].read_from(values);
        self.record(SinkOp::Splats { channel, rect: values.rect().intersect(&rect) });
    }

    fn heights(&self) -> Option<&Matrix> {
        Some(&self.heights)
    }
}

/// Produces a [`MemorySink`] per level, all sharing one journal
#[derive(Debug, Default)]
pub struct MemorySinkFactory {
    journal: SinkJournal,
    created: usize,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> SinkJournal {
        self.journal.clone()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn label(coord: Coord, kind: LevelKind) -> String {
        format!("{} {}", coord, kind)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&mut self, kind: LevelKind, area: &Area) -> Box<dyn TerrainSink> {
        self.created += 1;
        let label = Self::label(area.coord, kind);
        log::trace!("Creating sink {}", label);
        Box::new(MemorySink::new(label, area.active()).with_journal(self.journal.clone()))
    }
}
