//! Process-level setup.
//!
//! The request loggers never touch the global logger; this only configures
//! the `log` facade that receives the crate's own diagnostics and the
//! fallback request logger's output.

mod logger;

pub use logger::init_logger_with;
