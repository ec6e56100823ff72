//! Tile snapshots on disk
//!
//! Only border edges and readiness flags persist; grids are regenerated.
//! Files are rkyv archives compressed with LZ4.

use super::weld::EdgesSet;
use crate::core::{Error, Result};
use crate::math::Coord;
use rkyv::{Archive, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted state of one detail level
#[derive(Clone, Debug, PartialEq, Archive, Deserialize, Serialize)]
pub struct LevelSnapshot {
    pub edges: EdgesSet,
    pub generate_ready: bool,
    pub apply_ready: bool,
}

impl LevelSnapshot {
    /// Flags to restore: both kept only when both were set
    pub fn restored_flags(&self) -> (bool, bool) {
        let complete = self.generate_ready && self.apply_ready;
        (complete, complete)
    }
}

/// Persisted state of one tile
#[derive(Clone, Debug, PartialEq, Archive, Deserialize, Serialize)]
pub struct TileSnapshot {
    pub coord: Coord,
    pub distance: f32,
    pub main: Option<LevelSnapshot>,
    pub draft: Option<LevelSnapshot>,
}

/// Serialize a snapshot to bytes (uncompressed)
pub fn serialize_snapshot(snapshot: &TileSnapshot) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(snapshot)
        .map_err(|e| Error::Persist(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize a snapshot from bytes (uncompressed)
pub fn deserialize_snapshot(data: &[u8]) -> Result<TileSnapshot> {
    // archives must be read from aligned memory
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
    aligned.extend_from_slice(data);

    let archived = rkyv::access::<ArchivedTileSnapshot, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Persist(e.to_string()))?;
    rkyv::deserialize::<TileSnapshot, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Persist(e.to_string()))
}

pub fn compress_snapshot(snapshot: &TileSnapshot) -> Result<Vec<u8>> {
    let serialized = serialize_snapshot(snapshot)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

pub fn decompress_snapshot(data: &[u8]) -> Result<TileSnapshot> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Persist(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_snapshot(&decompressed)
}

/// File path of the snapshot for a tile coordinate
pub fn snapshot_path(base_dir: &Path, coord: Coord) -> PathBuf {
    base_dir.join(format!("tile_{}_{}.tts", coord.x, coord.z))
}

/// Save a snapshot to disk (compressed)
pub async fn save_snapshot(base_dir: &Path, snapshot: &TileSnapshot) -> Result<()> {
    let path = snapshot_path(base_dir, snapshot.coord);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let compressed = compress_snapshot(snapshot)?;
    tokio::fs::write(&path, compressed).await?;
    log::debug!("Saved tile snapshot {}", path.display());
    Ok(())
}

/// Load a snapshot from disk, `None` if there is none for `coord`
pub async fn load_snapshot(base_dir: &Path, coord: Coord) -> Result<Option<TileSnapshot>> {
    let path = snapshot_path(base_dir, coord);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let compressed = tokio::fs::read(&path).await?;
    decompress_snapshot(&compressed).map(Some)
}

pub async fn delete_snapshot(base_dir: &Path, coord: Coord) -> Result<()> {
    let path = snapshot_path(base_dir, coord);
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::weld::{Edges, Side};

    fn sample() -> TileSnapshot {
        let mut layer = Edges::default();
        layer.set_side(Side::Left, vec![0.1, 0.2, 0.3]);
        let edges = EdgesSet { layers: vec![layer], ready: true, generation: 42 };
        TileSnapshot {
            coord: Coord::new(-3, 7),
            distance: 1.5,
            main: Some(LevelSnapshot { edges: edges.clone(), generate_ready: true, apply_ready: false }),
            draft: Some(LevelSnapshot { edges, generate_ready: true, apply_ready: true }),
        }
    }

    #[test]
    fn test_compressed_roundtrip() {
        let snapshot = sample();
        let bytes = compress_snapshot(&snapshot).unwrap();
        let restored = decompress_snapshot(&bytes).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_corrupt_data_is_an_error() {
        assert!(matches!(decompress_snapshot(&[1, 2, 3]), Err(Error::Persist(_))));
    }

    #[test]
    fn test_restored_flags() {
        let snapshot = sample();
        assert_eq!(snapshot.main.unwrap().restored_flags(), (false, false));
        assert_eq!(snapshot.draft.unwrap().restored_flags(), (true, true));
    }

    #[tokio::test]
    async fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample();

        assert!(load_snapshot(dir.path(), snapshot.coord).await.unwrap().is_none());
        save_snapshot(dir.path(), &snapshot).await.unwrap();
        let loaded = load_snapshot(dir.path(), snapshot.coord).await.unwrap();
        assert_eq!(loaded, Some(snapshot.clone()));

        delete_snapshot(dir.path(), snapshot.coord).await.unwrap();
        assert!(load_snapshot(dir.path(), snapshot.coord).await.unwrap().is_none());
    }
}
