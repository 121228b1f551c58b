//! Log subscriber setup.
//!
//! Libraries in this workspace only emit `tracing` events; the binary decides
//! where they go. [`init`] installs a formatted stderr subscriber filtered by
//! `RUST_LOG`, or by [`EngineConfig::log_filter`] when `RUST_LOG` is unset.

use tracing_subscriber::EnvFilter;

use crate::config::{EngineConfig, EngineError};

/// The filter [`init`] would install for `config`.
pub fn env_filter(config: &EngineConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`EngineError::Logging`] if a global subscriber is already installed.
pub fn init(config: &EngineConfig) -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true)
        .try_init()
        .map_err(EngineError::Logging)
}
