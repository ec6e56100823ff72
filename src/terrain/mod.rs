//! Tiled terrain: detail levels, passes, welding and the session coordinating them

pub mod area;
pub mod detail;
pub mod settings;
pub mod objects;
pub mod tile_data;
pub mod apply;
pub mod sink;
pub mod events;
pub mod graph;
pub mod noise_graph;
pub mod weld;
pub mod tile;
pub mod tile_set;
pub mod persist;
pub mod session;

pub use area::Area;
pub use detail::{DetailLevel, LevelKind, LevelStage};
pub use settings::TerrainSettings;
pub use objects::{ObjectInstance, ObjectPool};
pub use tile_data::{TileData, TileProducts};
pub use apply::{ApplyOperation, ResumableApply};
pub use sink::{MemorySink, MemorySinkFactory, SinkEvent, SinkFactory, SinkJournal, SinkOp, TerrainSink};
pub use events::{CompleteEvent, LodSwitchEvent, NodeEvent, PreviewEvent, TileEvent, TileEvents};
pub use graph::{GenerateContext, Graph};
pub use noise_graph::{NoiseGraph, NoiseParams};
pub use weld::{Corner, EdgeFixup, Edges, EdgesSet, Side};
pub use tile::{Tile, TileId};
pub use tile_set::{EdgeBoard, TileSet};
pub use persist::{LevelSnapshot, TileSnapshot};
pub use session::{DeployStats, SessionStats, TerrainSession};
