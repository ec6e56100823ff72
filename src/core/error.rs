//! Error types for the terratile crate

use crate::matrix::MatrixError;
use crate::terrain::TileId;
use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persist(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown tile: {0}")]
    UnknownTile(TileId),

    #[error("Streaming error: {0}")]
    Streaming(String),
}
