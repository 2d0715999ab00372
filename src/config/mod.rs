//! Buffering configuration and constants.
//!
//! This module provides:
//! - [`BufferConfig`], the settings a buffering writer is built with
//! - Default values and field-name constants
//! - CLI option types for the demo binary

mod constants;
mod types;

pub use constants::*;
pub use types::{BufferConfig, LogFormat, LogLevel, Opt};
