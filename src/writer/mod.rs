//! Per-request buffering writer.
//!
//! A [`BufferingWriter`] sits between a request's logger and the shared
//! downstream sink. Records are held in memory until one of three things
//! happens:
//!
//! - a record at a configured trigger severity arrives (error, optionally warn)
//! - the buffer would grow past `buffer_size`
//! - the request ends and [`BufferingWriter::finalize`] decides to keep or drop
//!
//! The first two (and an explicit [`BufferingWriter::flush`]) write everything
//! buffered so far, then switch the writer to pass-through for the rest of the
//! request. Once a writer passes through it never buffers again.
//!
//! # Thread Safety
//!
//! All state sits behind one mutex, held across the whole check-decide-write
//! sequence including the downstream write. Two concurrent writers can never
//! both observe "not yet flushed" and emit the buffer twice, and records reach
//! the downstream in the order the lock was acquired.

mod sampler;
#[cfg(test)]
mod tests;

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::config::BufferConfig;
use crate::downstream::LogSink;
use crate::severity::{classify, Severity};
use crate::stats::{BufferStats, Outcome};

pub use sampler::{FixedSampler, Sampler, SeededSampler, ThreadRngSampler};

#[derive(Default)]
struct State {
    buffer: Vec<u8>,
    accumulated_size: usize,
    flushed: bool,
}

/// Buffers one request's log records and decides whether they are persisted.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use emitlog::{BufferConfig, BufferingWriter};
///
/// let downstream = Arc::new(Mutex::new(Vec::new()));
/// let config = BufferConfig { save_rate: 0.0, ..Default::default() };
/// let writer = BufferingWriter::new(downstream.clone(), config, "req-1");
///
/// writer.write(b"{\"level\":\"info\",\"message\":\"hello\"}\n").unwrap();
/// assert!(downstream.lock().unwrap().is_empty());
///
/// // A failed request always keeps its logs
/// writer.finalize(false).unwrap();
/// assert!(!downstream.lock().unwrap().is_empty());
/// ```
pub struct BufferingWriter {
    state: Mutex<State>,
    downstream: Arc<dyn LogSink>,
    config: BufferConfig,
    request_id: String,
    sampler: Arc<dyn Sampler>,
    stats: Option<Arc<BufferStats>>,
}

impl BufferingWriter {
    /// Creates a writer for one unit of work.
    ///
    /// With `buffering_enabled = false` the writer starts in pass-through
    /// mode: every record goes straight downstream and `finalize` has nothing
    /// left to decide.
    pub fn new(
        downstream: Arc<dyn LogSink>,
        config: BufferConfig,
        request_id: impl Into<String>,
    ) -> Self {
        let state = State {
            flushed: !config.buffering_enabled,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            downstream,
            config,
            request_id: request_id.into(),
            sampler: Arc::new(ThreadRngSampler),
            stats: None,
        }
    }

    /// Replaces the random source used by the save-on-success decision.
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Reports this writer's outcome into shared counters.
    pub fn with_stats(mut self, stats: Arc<BufferStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// True once the writer has switched to pass-through.
    pub fn is_flushed(&self) -> bool {
        self.lock().flushed
    }

    /// Bytes currently held in the buffer.
    pub fn buffered_len(&self) -> usize {
        self.lock().accumulated_size
    }

    /// Accepts one serialized record.
    ///
    /// Returns the number of bytes accepted, which is `record.len()` when the
    /// record is buffered, or whatever the downstream reports when it is
    /// forwarded.
    ///
    /// # Errors
    ///
    /// Returns the downstream's error if a flush or forward fails. A buffer
    /// that failed to flush is still cleared; it is never retried. When the
    /// buffered prefix fails, the triggering record is still attempted and
    /// the first error is returned.
    pub fn write(&self, record: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();

        if state.flushed {
            return self.forward(record);
        }

        let severity = classify(record);
        let trigger = self.severity_trigger(severity).or_else(|| {
            let projected = state.accumulated_size.saturating_add(record.len());
            (projected > self.config.buffer_size).then_some(Outcome::FlushedOnOverflow)
        });

        if let Some(outcome) = trigger {
            debug!(
                "Flushing {} buffered bytes for request {} ({})",
                state.accumulated_size,
                self.request_id,
                outcome.as_ref()
            );
            state.flushed = true;
            self.record(outcome);
            // The triggering record is forwarded even if the buffer write failed
            let drained = self.drain(&mut state);
            let forwarded = self.forward(record);
            return drained.and(forwarded);
        }

        state.buffer.extend_from_slice(record);
        state.accumulated_size += record.len();
        Ok(record.len())
    }

    /// Writes out whatever is buffered and switches to pass-through,
    /// regardless of configuration. Safe to call more than once.
    ///
    /// Meant for abnormal termination (a panic in the handler) where the
    /// buffered context must not be lost.
    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.lock();
        if !state.flushed {
            state.flushed = true;
            self.record(Outcome::FlushedExplicitly);
        }
        self.drain(&mut state)
    }

    /// Whether a successful request's logs should be kept.
    ///
    /// Draws from the sampler only when `0 < save_rate < 100`.
    pub fn should_persist_on_success(&self) -> bool {
        if !self.config.buffering_enabled {
            return true;
        }
        if self.config.save_rate <= 0.0 {
            return false;
        }
        if self.config.save_rate >= 100.0 {
            return true;
        }
        self.sampler.sample_percent() < self.config.save_rate
    }

    /// Ends the unit of work.
    ///
    /// A failed request always keeps its buffer; a successful one keeps it
    /// only if [`should_persist_on_success`](Self::should_persist_on_success)
    /// says so. Does nothing if the writer already flushed. The buffer is
    /// empty afterwards either way, and later calls are no-ops.
    pub fn finalize(&self, success: bool) -> io::Result<()> {
        let mut state = self.lock();
        if state.flushed {
            return Ok(());
        }
        state.flushed = true;

        let outcome = if !success {
            Outcome::PersistedOnFailure
        } else if self.should_persist_on_success() {
            Outcome::PersistedBySampling
        } else {
            Outcome::Discarded
        };
        self.record(outcome);

        if outcome == Outcome::Discarded {
            trace!(
                "Discarding {} buffered bytes for request {}",
                state.accumulated_size,
                self.request_id
            );
            state.buffer.clear();
            state.accumulated_size = 0;
            return Ok(());
        }
        self.drain(&mut state)
    }

    fn severity_trigger(&self, severity: Severity) -> Option<Outcome> {
        match severity {
            s if s.is_error_or_worse() && self.config.flush_on_error => {
                Some(Outcome::FlushedOnError)
            }
            Severity::Warn if self.config.flush_on_warn => Some(Outcome::FlushedOnWarn),
            _ => None,
        }
    }

    // Writes the whole buffer downstream in one call and clears it, even
    // when the write fails.
    fn drain(&self, state: &mut State) -> io::Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let result = self.forward(&state.buffer);
        state.buffer.clear();
        state.accumulated_size = 0;
        result.map(|_| ())
    }

    fn forward(&self, bytes: &[u8]) -> io::Result<usize> {
        let result = self.downstream.write(bytes);
        if result.is_err() {
            if let Some(stats) = &self.stats {
                stats.record_write_error();
            }
        }
        result
    }

    fn record(&self, outcome: Outcome) {
        if let Some(stats) = &self.stats {
            stats.record(outcome);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is consistent between statements, so a poisoned lock is usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for BufferingWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        BufferingWriter::write(self, buf)
    }
}

impl fmt::Debug for BufferingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BufferingWriter")
            .field("request_id", &self.request_id)
            .field("config", &self.config)
            .field("buffered", &state.accumulated_size)
            .field("flushed", &state.flushed)
            .finish()
    }
}
