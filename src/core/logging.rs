//! Logging setup for hosts and tests
//!
//! The session logs pass submission and LOD switches at `debug` and per-step
//! detail (fixups, stale results) at `trace`. Set `RUST_LOG=terratile=trace`
//! to follow a single tile through its passes.

/// Default filter: crate and bundled binary at `info`, dependencies quiet
pub const DEFAULT_FILTER: &str = "warn,terratile=info,simulate_tiles=info";

/// Initialize env_logger with millisecond timestamps
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]. Calling this twice is a no-op.
///
/// # Example
/// ```
/// terratile::core::logging::init();
/// log::info!("Session started");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(DEFAULT_FILTER)
    )
    .format_timestamp_millis()
    .try_init();
}

/// Initialize logging for tests; output is captured per test
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,terratile=debug")
    )
    .is_test(true)
    .try_init();
}
