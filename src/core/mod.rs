//! Core types and utilities

pub mod types;
pub mod error;
pub mod events;
pub mod logging;

pub use types::*;
pub use error::Error;
pub use events::{ObserverId, ObserverList};
