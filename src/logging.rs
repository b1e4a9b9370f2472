//! Log output setup.
//!
//! Library code only emits `tracing` events. Embedding applications either
//! install their own subscriber or call [`init_logging`] once at startup.

use tracing::Level;

use crate::config::Settings;

/// Parses a level name (case-insensitive).
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Installs a stderr fmt subscriber at `settings.logging.level`.
///
/// Unknown levels fall back to `info`. Returns `false` when a global
/// subscriber was already installed.
pub fn init_logging(settings: &Settings) -> bool {
    let level = parse_level(&settings.logging.level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
