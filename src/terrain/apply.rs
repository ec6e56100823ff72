//! Apply operations: the units that move generated data onto a sink

use super::sink::TerrainSink;
use super::tile_data::TileData;
use crate::math::CoordRect;
use crate::matrix::Matrix;
use crate::streaming::StepStatus;
use std::fmt;

/// Multi-step apply operation, advanced once per cooperative tick
pub trait ResumableApply: Send {
    /// Do the next slice of work
    fn step(&mut self, data: &TileData, sink: &mut dyn TerrainSink) -> StepStatus;
}

/// Body of an immediate apply operation
pub type ApplyFn = Box<dyn FnOnce(&TileData, &mut dyn TerrainSink) + Send>;

/// One queued write onto a sink
pub enum ApplyOperation {
    /// Runs to completion in a single call
    Immediate(ApplyFn),
    /// Spread over several ticks
    Resumable(Box<dyn ResumableApply>),
}

impl ApplyOperation {
    pub fn immediate(f: impl FnOnce(&TileData, &mut dyn TerrainSink) + Send + 'static) -> Self {
        ApplyOperation::Immediate(Box::new(f))
    }

    pub fn resumable(op: impl ResumableApply + 'static) -> Self {
        ApplyOperation::Resumable(Box::new(op))
    }

    /// Write the whole height grid at once
    pub fn heights() -> Self {
        Self::immediate(|data, sink| {
            if let Some(height) = &data.products.height {
                sink.set_heights(height);
            }
        })
    }

    /// Write the height grid `rows` rows per tick
    pub fn heights_in_strips(rows: i32) -> Self {
        Self::resumable(HeightStrips { rows: rows.max(1), next: None })
    }

    /// Write every splat channel at once
    pub fn splats() -> Self {
        Self::immediate(|data, sink| {
            for (channel, splat) in data.products.splats.iter().enumerate() {
                sink.set_splats(channel, splat);
            }
        })
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, ApplyOperation::Resumable(_))
    }

    /// Run the whole operation now, stepping resumables until done
    pub fn run_to_completion(self, data: &TileData, sink: &mut dyn TerrainSink) {
        match self {
            ApplyOperation::Immediate(f) => f(data, sink),
            ApplyOperation::Resumable(mut op) => while op.step(data, sink) == StepStatus::Continue {},
        }
    }
}

impl fmt::Debug for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOperation::Immediate(_) => write!(f, "ApplyOperation::Immediate"),
            ApplyOperation::Resumable(_) => write!(f, "ApplyOperation::Resumable"),
        }
    }
}

/// Height apply split into horizontal strips of the sink's rect
struct HeightStrips {
    rows: i32,
    next: Option<i32>,
}

impl ResumableApply for HeightStrips {
    fn step(&mut self, data: &TileData, sink: &mut dyn TerrainSink) -> StepStatus {
        let Some(height) = &data.products.height else {
            return StepStatus::Done;
        };
        let target = sink.rect();
        let start = self.next.unwrap_or(target.offset.z);
        let end = (start + self.rows).min(target.max().z);

        let strip = CoordRect::from_xz(target.offset.x, start, target.size.x, end - start);
        let mut part = Matrix::new(strip);
        part.read_from(height);
        sink.set_heights(&part);

        if end >= target.max().z {
            StepStatus::Done
        } else {
            self.next = Some(end);
            StepStatus::Continue
        }
    }
}
