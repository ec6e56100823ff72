//! One resolution variant of a tile and its lifecycle bookkeeping

use super::apply::ResumableApply;
use super::sink::TerrainSink;
use super::tile_data::TileData;
use super::weld::EdgesSet;
use crate::streaming::{LevelReadiness, StopToken, WorkId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Main (full detail) or draft (cheap preview)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize,
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub enum LevelKind {
    Main,
    Draft,
}

impl LevelKind {
    pub const ALL: [LevelKind; 2] = [LevelKind::Main, LevelKind::Draft];

    pub fn is_draft(self) -> bool {
        self == LevelKind::Draft
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Main => write!(f, "main"),
            LevelKind::Draft => write!(f, "draft"),
        }
    }
}

/// Where a detail level is in its generate/apply cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LevelStage {
    Idle,
    Queued,
    Generating,
    Welding,
    Applying,
    Ready,
}

/// Progress of a background pass, written by the worker
#[derive(Debug, Default)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) const QUEUED: u8 = 0;
    pub(crate) const GENERATING: u8 = 1;
    pub(crate) const WELDING: u8 = 2;
    pub(crate) const FINISHED: u8 = 3;

    pub(crate) fn set(&self, phase: u8) {
        self.0.store(phase, Ordering::Release);
    }

    pub(crate) fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle of the background job of the current pass
#[derive(Debug, Clone)]
pub(crate) struct PassTask {
    pub(crate) id: WorkId,
    pub(crate) stop: Arc<StopToken>,
    pub(crate) phase: Arc<PhaseCell>,
}

/// Data, sink, edges and readiness of one detail level
pub struct DetailLevel {
    kind: LevelKind,
    /// `None` while a background job owns the data
    pub(crate) data: Option<TileData>,
    pub(crate) sink: Option<Box<dyn TerrainSink>>,
    pub(crate) edges: Arc<EdgesSet>,
    pub(crate) generate_ready: bool,
    pub(crate) apply_ready: bool,
    /// In-flight background job, if any
    pub(crate) task: Option<PassTask>,
    /// Token of the current pass, kept until its apply finishes
    pub(crate) pass: Option<Arc<StopToken>>,
    /// Resumable apply operation that yielded mid-way
    pub(crate) resuming: Option<Box<dyn ResumableApply>>,
}

impl DetailLevel {
    pub fn new(kind: LevelKind) -> Self {
        Self {
            kind,
            data: None,
            sink: None,
            edges: Arc::new(EdgesSet::default()),
            generate_ready: false,
            apply_ready: false,
            task: None,
            pass: None,
            resuming: None,
        }
    }

    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    pub fn generate_ready(&self) -> bool {
        self.generate_ready
    }

    pub fn apply_ready(&self) -> bool {
        self.apply_ready
    }

    pub fn readiness(&self) -> LevelReadiness {
        LevelReadiness { generate_ready: self.generate_ready, apply_ready: self.apply_ready }
    }

    pub fn is_ready(&self) -> bool {
        self.generate_ready && self.apply_ready
    }

    /// Cached border samples, kept across passes and sessions
    pub fn edges(&self) -> &Arc<EdgesSet> {
        &self.edges
    }

    pub fn data(&self) -> Option<&TileData> {
        self.data.as_ref()
    }

    pub fn sink(&self) -> Option<&dyn TerrainSink> {
        self.sink.as_deref()
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn stage(&self) -> LevelStage {
        if let Some(task) = &self.task {
            return match task.phase.get() {
                PhaseCell::QUEUED => LevelStage::Queued,
                PhaseCell::GENERATING => LevelStage::Generating,
                // finished jobs wait for the main thread to pick up the outcome
                _ => LevelStage::Welding,
            };
        }
        match (self.generate_ready, self.apply_ready) {
            (true, true) => LevelStage::Ready,
            (true, false) => LevelStage::Applying,
            _ => LevelStage::Idle,
        }
    }

    /// Whether `token` belongs to the pass this level currently runs
    pub(crate) fn owns_pass(&self, token: &Arc<StopToken>) -> bool {
        self.pass.as_ref().is_some_and(|p| Arc::ptr_eq(p, token)) && !token.is_stopped()
    }

    /// Progress of the apply queue in 0..=1
    pub fn apply_progress(&self) -> f32 {
        if self.apply_ready {
            return 1.0;
        }
        match &self.data {
            Some(data) if self.generate_ready && data.apply_total() > 0 => {
                data.applied_count() as f32 / data.apply_total() as f32
            }
            _ => 0.0,
        }
    }

    /// Set readiness from persisted flags. Anything short of fully ready is
    /// reset, so half-applied levels are regenerated.
    pub(crate) fn restore_flags(&mut self, generate_ready: bool, apply_ready: bool) {
        let complete = generate_ready && apply_ready;
        self.generate_ready = complete;
        self.apply_ready = complete;
    }
}

impl fmt::Debug for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailLevel")
            .field("kind", &self.kind)
            .field("stage", &self.stage())
            .field("generate_ready", &self.generate_ready)
            .field("apply_ready", &self.apply_ready)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
