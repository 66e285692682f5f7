//! Process-wide tracing setup for the coordinator binaries.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::{WarmRestartError, WarmResult};

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
/// when `verbose` is set.
pub fn init_logging(verbose: bool) -> WarmResult<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| WarmRestartError::invalid_config("logging", format!("Failed to set logger: {}", e)))
}
