//! Tracing subscriber setup for binaries and tests embedding the engine.

use tracing_subscriber::EnvFilter;

/// Environment variable that forces `debug` level output.
pub const DEBUG_ENV: &str = "FOCUSGUARD_DEBUG";

/// Build the filter: `FOCUSGUARD_DEBUG=1` wins, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    let debug_enabled = std::env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install a global fmt subscriber. Returns false if one was already set.
pub fn init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}
