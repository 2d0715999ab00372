//! axum middleware that gives every request its own buffered logger.
//!
//! For each request the middleware:
//! - generates a request id and binds it, with method, path and client address,
//!   to a [`RequestLogger`]
//! - routes that logger into a fresh [`BufferingWriter`] (unless buffering is
//!   disabled, in which case it writes straight downstream)
//! - makes the logger available to handlers through the request extensions
//! - flushes the buffer if the handler panics, answering 500
//! - finalizes the buffer with `success = status < 400`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use emitlog::{BufferConfig, BufferedLogging, RequestLogger, StdoutSink};
//!
//! async fn handler(logger: RequestLogger) -> &'static str {
//!     logger.debug("doing work");
//!     "ok"
//! }
//!
//! let logging = BufferedLogging::new(BufferConfig::default(), Arc::new(StdoutSink));
//! let app: Router = logging.layer(Router::new().route("/", get(handler)));
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::FutureExt;
use log::warn;
use uuid::Uuid;

use crate::config::{
    BufferConfig, ERROR_STATUS_THRESHOLD, FIELD_METHOD, FIELD_PATH, FIELD_REMOTE_ADDR,
    FIELD_REQUEST_ID, REQUEST_ID_HEADER,
};
use crate::downstream::LogSink;
use crate::logger::{Output, RequestLogger};
use crate::severity::Severity;
use crate::stats::BufferStats;
use crate::writer::BufferingWriter;

/// Shared middleware state: configuration, the downstream sink, and outcome
/// counters.
#[derive(Clone)]
pub struct BufferedLogging {
    config: BufferConfig,
    downstream: Arc<dyn LogSink>,
    stats: Arc<BufferStats>,
}

impl BufferedLogging {
    pub fn new(config: BufferConfig, downstream: Arc<dyn LogSink>) -> Self {
        Self {
            config,
            downstream,
            stats: Arc::new(BufferStats::new()),
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<BufferStats> {
        &self.stats
    }

    /// Wraps every route of `router` in [`buffered_logging`].
    pub fn layer<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self, buffered_logging))
    }
}

/// The middleware function. Use with `axum::middleware::from_fn_with_state`
/// or through [`BufferedLogging::layer`].
pub async fn buffered_logging(
    State(logging): State<BufferedLogging>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let writer = logging.config.buffering_enabled.then(|| {
        Arc::new(
            BufferingWriter::new(
                logging.downstream.clone(),
                logging.config.clone(),
                request_id.clone(),
            )
            .with_stats(logging.stats.clone()),
        )
    });
    let output: Arc<dyn LogSink> = match &writer {
        Some(writer) => writer.clone(),
        None => logging.downstream.clone(),
    };

    let logger = RequestLogger::new(Output::Sink(output))
        .with_field(FIELD_REQUEST_ID, request_id.clone())
        .with_field(FIELD_METHOD, request.method().as_str())
        .with_field(FIELD_PATH, request.uri().path())
        .with_field(FIELD_REMOTE_ADDR, remote_addr);

    logger.info("Request started");
    request.extensions_mut().insert(logger.clone());

    let mut response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            logger
                .event(Severity::Error)
                .field("panic", panic_message(&*payload))
                .msg("Request panicked");
            if let Some(writer) = &writer {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush logs for request {}: {}", writer.request_id(), e);
                }
            }
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    };

    let status = response.status().as_u16();
    let success = status < ERROR_STATUS_THRESHOLD;
    logger
        .event(Severity::Info)
        .field("status_code", status)
        .field("duration_ms", start.elapsed().as_secs_f64() * 1000.0)
        .field("success", success)
        .msg("Request completed");

    if let Some(writer) = &writer {
        if let Err(e) = writer.finalize(success) {
            warn!(
                "Failed to persist logs for request {}: {}",
                writer.request_id(),
                e
            );
        }
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
