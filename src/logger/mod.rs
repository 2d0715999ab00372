//! Request-scoped structured logger.
//!
//! [`RequestLogger`] renders each event as one compact JSON object per line,
//! with the fields bound to the logger (request id, method, path, ...) merged
//! in. Lines go either to a [`LogSink`] (usually the request's
//! [`BufferingWriter`](crate::BufferingWriter)) or, for the fallback logger,
//! to the process-wide `log` facade.
//!
//! ```json
//! {"level":"info","message":"Request started","method":"GET","path":"/","request_id":"...","time":"..."}
//! ```

mod extract;

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::config::{FALLBACK_TARGET, FIELD_LEVEL, FIELD_MESSAGE, FIELD_TIME};
use crate::downstream::LogSink;
use crate::severity::Severity;

/// Where rendered lines go.
#[derive(Clone)]
pub enum Output {
    /// Write each line to a sink.
    Sink(Arc<dyn LogSink>),
    /// Hand each line to the `log` facade at the matching level.
    Facade,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Sink(_) => f.write_str("Sink"),
            Output::Facade => f.write_str("Facade"),
        }
    }
}

/// Cheap-to-clone JSON-lines logger with bound context fields.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    fields: Arc<Map<String, Value>>,
    output: Output,
}

impl RequestLogger {
    pub fn new(output: Output) -> Self {
        Self {
            fields: Arc::new(Map::new()),
            output,
        }
    }

    /// Logger writing to `sink`.
    pub fn to_sink(sink: Arc<dyn LogSink>) -> Self {
        Self::new(Output::Sink(sink))
    }

    /// Logger backed by the process logger, used when no request logger is
    /// in scope.
    pub fn fallback() -> Self {
        Self::new(Output::Facade)
    }

    /// Binds a field that is added to every event from this logger.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.fields).insert(key.into(), value.into());
        self
    }

    /// Same bound fields, different output.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.output, Output::Facade)
    }

    /// Starts an event that can carry extra fields.
    pub fn event(&self, severity: Severity) -> Event<'_> {
        Event {
            logger: self,
            severity,
            fields: Map::new(),
        }
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.event(Severity::Trace).msg(message)
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.event(Severity::Debug).msg(message)
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.event(Severity::Info).msg(message)
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.event(Severity::Warn).msg(message)
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.event(Severity::Error).msg(message)
    }

    fn emit(&self, severity: Severity, fields: Map<String, Value>, message: String) {
        let line = match render(&self.fields, severity, fields, message) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Failed to render request log event: {}", e);
                return;
            }
        };

        match &self.output {
            Output::Sink(sink) => {
                if let Err(e) = sink.write(&line) {
                    log::warn!("Failed to write request log event: {}", e);
                }
            }
            Output::Facade => {
                let text = String::from_utf8_lossy(&line);
                log::log!(
                    target: FALLBACK_TARGET,
                    severity.to_log_level(),
                    "{}",
                    text.trim_end()
                );
            }
        }
    }
}

/// An in-progress event. Nothing is written until [`Event::msg`].
#[must_use = "events are only written by calling `msg`"]
pub struct Event<'a> {
    logger: &'a RequestLogger,
    severity: Severity,
    fields: Map<String, Value>,
}

impl Event<'_> {
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Writes the event with `message`.
    pub fn msg(self, message: impl fmt::Display) {
        self.logger
            .emit(self.severity, self.fields, message.to_string());
    }
}

// Reserved keys are inserted last so bound or event fields cannot shadow them.
fn render(
    bound: &Map<String, Value>,
    severity: Severity,
    fields: Map<String, Value>,
    message: String,
) -> serde_json::Result<Vec<u8>> {
    let mut object = bound.clone();
    object.extend(fields);
    object.insert(
        FIELD_TIME.to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    object.insert(FIELD_MESSAGE.to_string(), Value::String(message));
    object.insert(
        FIELD_LEVEL.to_string(),
        Value::String(severity.as_str().to_string()),
    );

    let mut line = serde_json::to_vec(&Value::Object(object))?;
    line.push(b'\n');
    Ok(line)
}
