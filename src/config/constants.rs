//! Configuration constants used as defaults.

/// Default percentage of successful requests whose logs are kept.
pub const DEFAULT_SAVE_RATE: f64 = 5.0;

/// Default buffer capacity in bytes (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Responses with a status at or above this are treated as failed requests.
pub const ERROR_STATUS_THRESHOLD: u16 = 400;

/// Default listen port for the demo server.
pub const DEFAULT_PORT: u16 = 8080;

// Field names written by the request logger
pub const FIELD_LEVEL: &str = "level";
pub const FIELD_TIME: &str = "time";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_METHOD: &str = "method";
pub const FIELD_PATH: &str = "path";
pub const FIELD_REMOTE_ADDR: &str = "remote_addr";

/// Response header carrying the generated request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `log` target used when request logs fall back to the process logger.
pub const FALLBACK_TARGET: &str = "emitlog::request";
