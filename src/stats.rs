//! Buffering outcome counters.
//!
//! Every buffering writer ends in exactly one outcome: an early flush (and
//! the reason for it), or a final keep/discard decision. [`BufferStats`]
//! counts these across requests so the save rate and flush triggers can be
//! observed in production.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

/// How a buffering writer's logs were resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// An error/fatal/panic record triggered a flush
    FlushedOnError,
    /// A warning record triggered a flush
    FlushedOnWarn,
    /// The buffer would have exceeded its capacity
    FlushedOnOverflow,
    /// `flush()` was called explicitly (e.g. on a panic)
    FlushedExplicitly,
    /// The request failed, so its logs were kept
    PersistedOnFailure,
    /// The request succeeded and was picked by sampling
    PersistedBySampling,
    /// The request succeeded and its logs were dropped
    Discarded,
}

/// Thread-safe outcome counters, shared across writers via `Arc`.
pub struct BufferStats {
    outcomes: HashMap<Outcome, AtomicUsize>,
    write_errors: AtomicUsize,
}

impl BufferStats {
    pub fn new() -> Self {
        let mut outcomes = HashMap::new();
        for outcome in Outcome::iter() {
            outcomes.insert(outcome, AtomicUsize::new(0));
        }
        BufferStats {
            outcomes,
            write_errors: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, outcome: Outcome) {
        if let Some(counter) = self.outcomes.get(&outcome) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Outcome {:?} missing from stats map. This indicates a bug in BufferStats initialization.",
                outcome
            );
        }
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes
            .get(&outcome)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn write_errors(&self) -> usize {
        self.write_errors.load(Ordering::SeqCst)
    }

    /// Number of writers whose logs reached the downstream in any way.
    pub fn total_persisted(&self) -> usize {
        Outcome::iter()
            .filter(|o| *o != Outcome::Discarded)
            .map(|o| self.count(o))
            .sum()
    }

    /// Point-in-time copy suitable for serialization.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            outcomes: Outcome::iter()
                .map(|o| (o.as_ref().to_string(), self.count(o)))
                .collect(),
            total_persisted: self.total_persisted(),
            write_errors: self.write_errors(),
        }
    }
}

impl Default for BufferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON view of [`BufferStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub outcomes: std::collections::BTreeMap<String, usize>,
    pub total_persisted: usize,
    pub write_errors: usize,
}
