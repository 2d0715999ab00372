//! Downstream write sinks.
//!
//! A [`LogSink`] is where flushed records finally land. One sink is shared by
//! every in-flight request, so implementations must tolerate concurrent
//! callers.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A shared, concurrency-safe byte sink.
pub trait LogSink: Send + Sync {
    /// Writes `buf` in full and returns the number of bytes accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl<W: Write + Send> LogSink for Mutex<W> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(buf)?;
        Ok(buf.len())
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

/// Writes records to the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(buf)?;
        stdout.flush()?;
        Ok(buf.len())
    }
}
