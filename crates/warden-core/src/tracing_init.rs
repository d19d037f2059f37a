//! Global `tracing-subscriber` setup, shared by the CLI and by embedders
//! that want the same log shape without wiring `tracing-subscriber`
//! themselves.

use tracing_subscriber::EnvFilter;

/// Install a JSON-formatted subscriber reading its filter from
/// `RUST_LOG` (default `info`). Safe to call more than once — later
/// calls are no-ops once a global subscriber is set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).json().try_init();
}
