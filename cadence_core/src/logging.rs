//! Logging infrastructure for Cadence.
//!
//! Logs go to stderr so command output on stdout stays parseable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize logging for a `-v` count
///
/// RUST_LOG, when set, takes precedence over the verbosity.
pub fn init(verbosity: u8) {
    init_with_level(level_for_verbosity(verbosity))
}

/// Initialize logging with a specific default level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
