//! Severity classification for serialized log records.
//!
//! Records reach the buffering writer already serialized (JSON lines), so the
//! level is recovered with a substring scan for `"level":"<name>"` rather than
//! a full parse. A miss degrades to [`Severity::Info`], which only means the
//! record stays buffered.

use strum_macros::{AsRefStr, EnumIter};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Severity {
    /// Lowercase name as it appears in the `level` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
            Severity::Panic => "panic",
        }
    }

    /// True for error, fatal and panic.
    pub fn is_error_or_worse(&self) -> bool {
        *self >= Severity::Error
    }

    /// The closest `log` crate level. Fatal and panic collapse into `Error`.
    pub fn to_log_level(self) -> log::Level {
        match self {
            Severity::Trace => log::Level::Trace,
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warn => log::Level::Warn,
            Severity::Error | Severity::Fatal | Severity::Panic => log::Level::Error,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Scan order matters: the first marker found wins.
const MARKERS: &[(&[u8], Severity)] = &[
    (br#""level":"trace""#, Severity::Trace),
    (br#""level":"debug""#, Severity::Debug),
    (br#""level":"info""#, Severity::Info),
    (br#""level":"warn""#, Severity::Warn),
    (br#""level":"error""#, Severity::Error),
    (br#""level":"fatal""#, Severity::Fatal),
    (br#""level":"panic""#, Severity::Panic),
];

/// Extracts the severity of a serialized record, defaulting to `Info`.
pub fn classify(record: &[u8]) -> Severity {
    MARKERS
        .iter()
        .find(|(marker, _)| contains(record, marker))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Info)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
