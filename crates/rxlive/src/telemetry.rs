//! Log output for binaries built on rxlive.
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! the application's call. [`init`] is the stock choice: human-readable
//! lines on stderr, filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back
/// to `default_filter`.
///
/// Returns `false` if a global subscriber was already installed, in
/// which case nothing changes.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
