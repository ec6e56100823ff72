//! Terratile - tiled terrain generation with LOD switching and edge welding

pub mod core;
pub mod math;
pub mod matrix;
pub mod streaming;
pub mod terrain;
