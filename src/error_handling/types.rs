//! Error type definitions.

use log::SetLoggerError;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error binding the listen socket.
    #[error("Failed to bind to {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error types for buffering configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `save_rate` is not a percentage.
    #[error("save_rate must be within 0..=100, got {0}")]
    SaveRateOutOfRange(f64),
}
