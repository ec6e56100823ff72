//! Per-pass working state of a detail level

use super::apply::ApplyOperation;
use super::area::Area;
use super::graph::Graph;
use super::objects::ObjectInstance;
use crate::matrix::Matrix;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Grids and placements produced by a graph run
#[derive(Clone, Debug, Default)]
pub struct TileProducts {
    pub height: Option<Matrix>,
    pub splats: Vec<Matrix>,
    pub objects: Vec<ObjectInstance>,
}

impl TileProducts {
    /// Layer 0 is the height grid, layer `i >= 1` is splat channel `i - 1`
    pub fn layer(&self, layer: usize) -> Option<&Matrix> {
        match layer {
            0 => self.height.as_ref(),
            i => self.splats.get(i - 1),
        }
    }

    pub fn layer_mut(&mut self, layer: usize) -> Option<&mut Matrix> {
        match layer {
            0 => self.height.as_mut(),
            i => self.splats.get_mut(i - 1),
        }
    }

    /// Number of consecutive layers starting at 0
    pub fn layer_count(&self) -> usize {
        if self.height.is_some() { 1 + self.splats.len() } else { 0 }
    }

    pub fn clear(&mut self) {
        self.height = None;
        self.splats.clear();
        self.objects.clear();
    }
}

/// Working state of one generation pass
///
/// Owned by its [`DetailLevel`](super::DetailLevel) between passes and
/// handed to the background job while the pass runs.
pub struct TileData {
    pub area: Area,
    pub seed: i32,
    pub is_preview: bool,
    pub is_draft: bool,
    pub products: TileProducts,
    apply: VecDeque<ApplyOperation>,
    apply_total: usize,
    graph: Option<Arc<dyn Graph>>,
}

impl TileData {
    pub fn new(area: Area, is_draft: bool) -> Self {
        Self {
            area,
            seed: 0,
            is_preview: false,
            is_draft,
            products: TileProducts::default(),
            apply: VecDeque::new(),
            apply_total: 0,
            graph: None,
        }
    }

    /// Drop products and pending apply operations, keep placement
    pub fn clear(&mut self) {
        self.products.clear();
        self.apply.clear();
        self.apply_total = 0;
    }

    /// Prepare for a new pass
    pub(crate) fn reset(&mut self, area: Area, graph: Arc<dyn Graph>, is_preview: bool) {
        self.clear();
        self.area = area;
        self.seed = graph.seed();
        self.is_preview = is_preview && !self.is_draft;
        self.graph = Some(graph);
    }

    /// Graph snapshot this pass evaluates
    pub fn graph(&self) -> Option<&Arc<dyn Graph>> {
        self.graph.as_ref()
    }

    /// Queue an operation; operations are applied in push order
    pub fn push_apply(&mut self, op: ApplyOperation) {
        self.apply.push_back(op);
        self.apply_total += 1;
    }

    pub(crate) fn pop_apply(&mut self) -> Option<ApplyOperation> {
        self.apply.pop_front()
    }

    pub fn pending_apply(&self) -> usize {
        self.apply.len()
    }

    /// Operations pushed since the last clear
    pub fn apply_total(&self) -> usize {
        self.apply_total
    }

    pub fn applied_count(&self) -> usize {
        self.apply_total - self.apply.len()
    }
}

impl fmt::Debug for TileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileData")
            .field("area", &self.area)
            .field("seed", &self.seed)
            .field("is_preview", &self.is_preview)
            .field("is_draft", &self.is_draft)
            .field("layers", &self.products.layer_count())
            .field("objects", &self.products.objects.len())
            .field("pending_apply", &self.apply.len())
            .finish()
    }
}
