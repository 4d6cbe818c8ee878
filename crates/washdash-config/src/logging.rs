//! `tracing` subscriber setup

use crate::components::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, writing to stderr
///
/// `RUST_LOG` wins over the configured directive. Calling this more than once
/// (e.g. from several tests) leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
