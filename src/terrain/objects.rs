//! Scattered object placements of a tile

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One placed object (tree, rock, ...)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectInstance {
    pub position: Vec3,
    /// Rotation around the vertical axis, radians
    pub rotation: f32,
    pub scale: f32,
    /// Index of the prototype in the graph's object list
    pub prototype: u32,
}

/// Objects shown together with the tile's terrain
#[derive(Debug, Default)]
pub struct ObjectPool {
    instances: Vec<ObjectInstance>,
    visible: bool,
}

impl ObjectPool {
    pub fn instances(&self) -> &[ObjectInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn replace(&mut self, instances: &[ObjectInstance]) {
        self.instances.clear();
        self.instances.extend_from_slice(instances);
    }

    pub(crate) fn clear(&mut self) {
        self.instances.clear();
    }
}
