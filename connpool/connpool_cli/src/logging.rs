//! Log output for the command-line driver.
//!
//! Installs a `tracing-subscriber` formatter on stderr. Records emitted through
//! the `log` facade by `connpool_core` are forwarded into the same subscriber.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Initialise logging. `RUST_LOG` wins over `default_filter` when set.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| anyhow!("invalid log filter '{}': {}", default_filter, e))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
