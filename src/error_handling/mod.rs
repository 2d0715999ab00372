//! Error types.
//!
//! Sink operations themselves report failures as `std::io::Error`, matching
//! the `Write`-style contract they implement. The types here cover the edges:
//! configuration checks and process setup.

mod types;

pub use types::{ConfigError, InitializationError};
