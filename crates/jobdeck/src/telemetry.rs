//! Tracing bootstrap for hosts embedding the engine.
//!
//! The engine emits `tracing` spans from the lifecycle layer and `log`
//! records from the persistence layer; this installs a formatted
//! subscriber plus the log bridge so both end up in one stream.

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber with `RUST_LOG`-style filtering,
/// falling back to `default_filter` when the environment sets none.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Bridge `log` records into tracing. Fails only when a logger is
    // already installed, which is fine.
    let _ = LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
