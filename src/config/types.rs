//! Configuration types and CLI options.
//!
//! This module defines the buffering configuration consumed by
//! [`BufferingWriter`](crate::BufferingWriter) and the enums and structs used
//! for command-line argument parsing in the demo binary.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_PORT, DEFAULT_SAVE_RATE};
use crate::error_handling::ConfigError;

/// Logging level for the process logger.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format for the process logger.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Settings for one buffering writer.
///
/// The writer never validates these; a `buffer_size` of zero simply turns
/// every write into an overflow flush. Call [`BufferConfig::validate`] at the
/// edge where configuration is read.
///
/// # Examples
///
/// ```
/// use emitlog::BufferConfig;
///
/// let config = BufferConfig {
///     save_rate: 10.0,
///     flush_on_warn: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Percent probability (0-100) that logs of a successful request are kept
    pub save_rate: f64,

    /// When false, records are written straight through and always kept
    pub buffering_enabled: bool,

    /// Flush the buffer as soon as an error (or worse) record arrives
    pub flush_on_error: bool,

    /// Flush the buffer as soon as a warning record arrives
    pub flush_on_warn: bool,

    /// Maximum buffered bytes before an overflow flush
    pub buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            save_rate: DEFAULT_SAVE_RATE,
            buffering_enabled: true,
            flush_on_error: true,
            flush_on_warn: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl BufferConfig {
    /// Checks that `save_rate` is a finite percentage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SaveRateOutOfRange` if `save_rate` is NaN,
    /// infinite, or outside `0..=100`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.save_rate.is_finite() || !(0.0..=100.0).contains(&self.save_rate) {
            return Err(ConfigError::SaveRateOutOfRange(self.save_rate));
        }
        Ok(())
    }
}

/// Command-line options for the demo server.
///
/// # Examples
///
/// ```bash
/// # Keep 20% of successful requests, flush on warnings too
/// emitlog-demo --save-rate 20 --flush-on-warn
///
/// # Write every record immediately
/// emitlog-demo --disable-buffering
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "emitlog-demo",
    about = "Serves a few demo routes with per-request log buffering."
)]
pub struct Opt {
    /// Port to listen on (127.0.0.1)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Percent of successful requests whose logs are kept (0-100)
    #[arg(long, default_value_t = DEFAULT_SAVE_RATE)]
    pub save_rate: f64,

    /// Maximum buffered bytes per request before an overflow flush
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Flush a request's logs as soon as it logs a warning
    #[arg(long)]
    pub flush_on_warn: bool,

    /// Do not flush on error records; rely on the final decision only
    #[arg(long)]
    pub no_flush_on_error: bool,

    /// Write every record immediately
    #[arg(long)]
    pub disable_buffering: bool,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Opt {
    /// Builds the buffering configuration from the parsed flags.
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            save_rate: self.save_rate,
            buffering_enabled: !self.disable_buffering,
            flush_on_error: !self.no_flush_on_error,
            flush_on_warn: self.flush_on_warn,
            buffer_size: self.buffer_size,
        }
    }
}
