//! Process-wide logging initialization.
//!
//! Called exactly once at startup; everything downstream only emits records
//! through the `tracing` macros and never configures the sink.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Filtering follows `RUST_LOG`, defaulting
/// to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}
