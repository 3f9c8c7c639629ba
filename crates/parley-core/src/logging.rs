//! Logging initialization.
//!
//! One `tracing` subscriber for the whole client, filterable via
//! `RUST_LOG` (default `info`).

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
