//! Shared tracing/logging initialization.
//!
//! The broker daemon and the CLI use the same env-filter setup; the daemon
//! picks human-readable or JSON output, the CLI logs to stderr so stdout
//! stays clean for command output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber for the broker daemon.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"courier_broker=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = env_filter(default_filter);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialise the global tracing subscriber writing to stderr, so stdout
/// can carry command output (used by the CLI).
pub fn init_stderr_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    )
}
