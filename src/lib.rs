//! emitlog: per-request log buffering.
//!
//! Most requests succeed, and their debug chatter is rarely read. This crate
//! holds each request's structured logs in memory and writes them out only
//! when they turn out to matter:
//!
//! - a record at error severity (optionally warn) arrives, which flushes
//!   everything buffered so far plus the record itself
//! - the buffer would exceed its configured size
//! - the request fails
//! - the request succeeds and is picked by uniform sampling (`save_rate`)
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use emitlog::{BufferConfig, BufferingWriter, RequestLogger};
//!
//! let downstream = Arc::new(Mutex::new(Vec::new()));
//! let config = BufferConfig { save_rate: 0.0, ..Default::default() };
//! let writer = Arc::new(BufferingWriter::new(downstream.clone(), config, "req-42"));
//!
//! let logger = RequestLogger::to_sink(writer.clone()).with_field("request_id", "req-42");
//! logger.debug("looking things up");
//! assert!(downstream.lock().unwrap().is_empty());
//!
//! logger.error("lookup failed");
//! // The debug line and the error both reached the downstream
//! assert_eq!(String::from_utf8_lossy(&downstream.lock().unwrap()).lines().count(), 2);
//!
//! writer.finalize(false).unwrap();
//! ```
//!
//! With axum, [`BufferedLogging`] does all of this per request.

pub mod config;
pub mod downstream;
mod error_handling;
pub mod initialization;
pub mod logger;
pub mod middleware;
pub mod severity;
pub mod stats;
pub mod writer;

// Re-export public API
pub use config::{BufferConfig, LogFormat, LogLevel};
pub use downstream::{LogSink, StdoutSink};
pub use error_handling::{ConfigError, InitializationError};
pub use logger::{Output, RequestLogger};
pub use middleware::{buffered_logging, BufferedLogging};
pub use severity::{classify, Severity};
pub use stats::{BufferStats, Outcome};
pub use writer::{BufferingWriter, FixedSampler, Sampler, SeededSampler, ThreadRngSampler};
