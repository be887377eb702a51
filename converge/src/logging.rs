//! Development-time tracing for waits and lifecycle operations.
//!
//! Engine events (`debug!` per refresh, `info!` at lifecycle milestones,
//! `warn!` on timeouts and unexpected states) go to stderr. Nothing is
//! persisted.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=converge=debug converge id decode --kind cluster_endpoint db-1:reader-1
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
