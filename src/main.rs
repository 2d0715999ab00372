//! Demo server for per-request log buffering.
//!
//! A thin binary around the `emitlog` library that handles:
//! - Command-line argument parsing
//! - Process logger initialization
//! - Serving a handful of routes whose logs exercise each flush path
//!
//! Request logs are written to stdout; the process logger writes to stderr.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use emitlog::config::Opt;
use emitlog::initialization::init_logger_with;
use emitlog::stats::StatsSnapshot;
use emitlog::{BufferStats, BufferedLogging, InitializationError, RequestLogger, StdoutSink};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let config = opt.buffer_config();
    config
        .validate()
        .context("Invalid buffering configuration")?;

    let logging = BufferedLogging::new(config, Arc::new(StdoutSink));
    let app = build_app(logging);

    let addr = format!("127.0.0.1:{}", opt.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| InitializationError::BindError {
            addr: addr.clone(),
            source,
        })?;

    info!("Demo server listening on http://{}/", addr);
    info!("  - /       debug logs only (kept per --save-rate)");
    info!("  - /warn   logs a warning (flushed with --flush-on-warn)");
    info!("  - /error  logs an error (flushed immediately)");
    info!("  - /fail   responds 422 (always kept)");
    info!("  - /panic  handler panics (flushed, 500)");
    info!("  - /stats  outcome counters");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Demo server error")?;

    Ok(())
}

fn build_app(logging: BufferedLogging) -> Router {
    let stats = logging.stats().clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/warn", get(warn))
        .route("/error", get(error))
        .route("/fail", get(fail))
        .route("/panic", get(explode))
        .route("/stats", get(stats_handler))
        .with_state(stats);
    logging.layer(router)
}

async fn index(logger: RequestLogger) -> &'static str {
    logger.debug("Looking up greeting");
    logger.debug("Greeting found");
    "ok\n"
}

async fn warn(logger: RequestLogger) -> &'static str {
    logger.debug("Calling slow dependency");
    logger.warn("Dependency took longer than expected");
    "ok, but slow\n"
}

async fn error(logger: RequestLogger) -> &'static str {
    logger.debug("Reading cache");
    logger
        .event(emitlog::Severity::Error)
        .field("cache", "primary")
        .msg("Cache read failed, served from origin");
    "ok, recovered\n"
}

async fn fail(logger: RequestLogger) -> (StatusCode, &'static str) {
    logger.info("Validating input");
    (StatusCode::UNPROCESSABLE_ENTITY, "invalid input\n")
}

async fn explode(logger: RequestLogger) -> &'static str {
    logger.debug("About to do something unwise");
    panic!("handler exploded");
}

async fn stats_handler(State(stats): State<Arc<BufferStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}
