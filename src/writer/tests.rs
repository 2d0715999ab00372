use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use super::*;

/// Records every downstream write call separately.
#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    fn concatenated(&self) -> String {
        String::from_utf8(self.writes().concat()).unwrap()
    }
}

impl LogSink for RecordingSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.writes.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }
}

struct FailingSink;

impl LogSink for FailingSink {
    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "downstream gone"))
    }
}

fn config(save_rate: f64) -> BufferConfig {
    BufferConfig {
        save_rate,
        buffering_enabled: true,
        flush_on_error: true,
        flush_on_warn: false,
        buffer_size: 1024,
    }
}

fn writer_with(config: BufferConfig) -> (Arc<RecordingSink>, BufferingWriter) {
    let sink = Arc::new(RecordingSink::default());
    let writer = BufferingWriter::new(sink.clone(), config, "test-request");
    (sink, writer)
}

fn line(level: &str, msg: &str) -> Vec<u8> {
    format!("{{\"level\":\"{}\",\"message\":\"{}\"}}\n", level, msg).into_bytes()
}

#[test]
fn test_successful_request_with_zero_save_rate_writes_nothing() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(b"info A\n").unwrap();
    writer.write(b"debug B\n").unwrap();

    writer.finalize(true).unwrap();

    assert!(sink.writes().is_empty());
    assert_eq!(writer.buffered_len(), 0);
}

#[test]
fn test_failed_request_persists_buffer_in_order() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(b"info A\n").unwrap();
    writer.write(b"debug B\n").unwrap();

    writer.finalize(false).unwrap();

    // Persisted as a single downstream write, in arrival order
    assert_eq!(sink.writes(), vec![b"info A\ndebug B\n".to_vec()]);
}

#[test]
fn test_write_reports_full_length_when_buffered() {
    let (sink, writer) = writer_with(config(0.0));
    let record = line("info", "hello");
    assert_eq!(writer.write(&record).unwrap(), record.len());
    assert_eq!(writer.buffered_len(), record.len());
    assert!(sink.writes().is_empty());
}

#[test]
fn test_explicit_flush_preserves_order() {
    let (sink, writer) = writer_with(config(0.0));
    let records: Vec<_> = (0..5).map(|i| line("debug", &format!("m{}", i))).collect();
    for record in &records {
        writer.write(record).unwrap();
    }

    writer.flush().unwrap();

    assert_eq!(sink.writes(), vec![records.concat()]);
    assert!(writer.is_flushed());
}

#[test]
fn test_writes_after_flush_pass_through() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(&line("info", "before")).unwrap();
    writer.flush().unwrap();

    writer.write(&line("debug", "after-1")).unwrap();
    writer.write(&line("trace", "after-2")).unwrap();

    let writes = sink.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[1], line("debug", "after-1"));
    assert_eq!(writes[2], line("trace", "after-2"));
    assert_eq!(writer.buffered_len(), 0);
}

#[test]
fn test_flush_is_idempotent() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(&line("info", "once")).unwrap();

    writer.flush().unwrap();
    writer.flush().unwrap();
    writer.flush().unwrap();

    assert_eq!(sink.writes().len(), 1);
}

#[test]
fn test_flush_on_empty_buffer_writes_nothing() {
    let (sink, writer) = writer_with(config(0.0));
    writer.flush().unwrap();
    assert!(sink.writes().is_empty());
    assert!(writer.is_flushed());
}

#[test]
fn test_failure_persists_even_with_zero_save_rate() {
    let sink = Arc::new(RecordingSink::default());
    // The sampler would say "drop", but failure never samples
    let writer = BufferingWriter::new(sink.clone(), config(0.0), "r")
        .with_sampler(Arc::new(FixedSampler(99.9)));
    writer.write(&line("info", "context")).unwrap();

    writer.finalize(false).unwrap();

    assert_eq!(sink.concatenated(), String::from_utf8(line("info", "context")).unwrap());
}

#[test]
fn test_full_save_rate_always_persists() {
    for _ in 0..100 {
        let (sink, writer) = writer_with(config(100.0));
        writer.write(&line("info", "kept")).unwrap();
        writer.finalize(true).unwrap();
        assert_eq!(sink.writes().len(), 1);
    }
}

#[test]
fn test_zero_save_rate_never_persists() {
    for _ in 0..100 {
        let (sink, writer) = writer_with(config(0.0));
        writer.write(&line("info", "dropped")).unwrap();
        writer.finalize(true).unwrap();
        assert!(sink.writes().is_empty());
    }
}

#[test]
fn test_should_persist_on_success_uses_sampler() {
    let sink: Arc<dyn LogSink> = Arc::new(RecordingSink::default());
    let below = BufferingWriter::new(sink.clone(), config(30.0), "r")
        .with_sampler(Arc::new(FixedSampler(29.99)));
    let at = BufferingWriter::new(sink.clone(), config(30.0), "r")
        .with_sampler(Arc::new(FixedSampler(30.0)));
    assert!(below.should_persist_on_success());
    assert!(!at.should_persist_on_success());
}

#[test]
fn test_should_persist_on_success_extremes_skip_sampler() {
    struct PanickingSampler;
    impl Sampler for PanickingSampler {
        fn sample_percent(&self) -> f64 {
            panic!("sampler must not be consulted");
        }
    }

    let sink: Arc<dyn LogSink> = Arc::new(RecordingSink::default());
    for (rate, expected) in [(0.0, false), (-5.0, false), (100.0, true), (250.0, true)] {
        let writer = BufferingWriter::new(sink.clone(), config(rate), "r")
            .with_sampler(Arc::new(PanickingSampler));
        assert_eq!(writer.should_persist_on_success(), expected, "rate {}", rate);
    }

    let disabled = BufferConfig {
        buffering_enabled: false,
        ..config(0.0)
    };
    let writer =
        BufferingWriter::new(sink, disabled, "r").with_sampler(Arc::new(PanickingSampler));
    assert!(writer.should_persist_on_success());
}

#[test]
fn test_sampling_rate_is_statistically_close() {
    let sampler: Arc<dyn Sampler> = Arc::new(SeededSampler::new(0x5eed));
    let trials = 10_000;

    for save_rate in [5.0, 30.0, 75.0] {
        let mut persisted = 0;
        for _ in 0..trials {
            let (sink, writer) = writer_with(config(save_rate));
            let writer = writer.with_sampler(sampler.clone());
            writer.write(&line("info", "sampled")).unwrap();
            writer.finalize(true).unwrap();
            if !sink.writes().is_empty() {
                persisted += 1;
            }
        }
        let observed = persisted as f64 / trials as f64 * 100.0;
        assert!(
            (observed - save_rate).abs() <= 2.0,
            "save_rate {} observed {:.2}",
            save_rate,
            observed
        );
    }
}

#[test]
fn test_overflow_flushes_buffer_then_record() {
    let (sink, writer) = writer_with(BufferConfig {
        save_rate: 0.0,
        flush_on_error: false,
        flush_on_warn: false,
        buffer_size: 10,
        ..Default::default()
    });

    writer.write(b"12345").unwrap();
    // Exactly at capacity is still buffered
    writer.write(b"67890").unwrap();
    assert!(sink.writes().is_empty());
    assert!(!writer.is_flushed());

    writer.write(b"X").unwrap();

    assert_eq!(sink.writes(), vec![b"1234567890".to_vec(), b"X".to_vec()]);
    assert!(writer.is_flushed());

    writer.write(b"after").unwrap();
    assert_eq!(sink.writes().len(), 3);

    // The request's fate is already decided
    writer.finalize(true).unwrap();
    assert_eq!(sink.writes().len(), 3);
}

#[test]
fn test_single_record_larger_than_buffer() {
    let (sink, writer) = writer_with(BufferConfig {
        buffer_size: 4,
        ..config(0.0)
    });
    writer.write(b"way too long").unwrap();
    assert_eq!(sink.writes(), vec![b"way too long".to_vec()]);
    assert!(writer.is_flushed());
}

#[test]
fn test_zero_buffer_size_passes_everything_through() {
    let (sink, writer) = writer_with(BufferConfig {
        buffer_size: 0,
        ..config(0.0)
    });
    writer.write(&line("debug", "a")).unwrap();
    writer.write(&line("debug", "b")).unwrap();
    writer.finalize(true).unwrap();
    assert_eq!(sink.writes().len(), 2);
}

#[test]
fn test_error_triggers_flush_but_warn_does_not() {
    let (sink, writer) = writer_with(config(0.0));
    let info = line("info", "start");
    let warn = line("warn", "slow");
    let error = line("error", "boom");

    writer.write(&info).unwrap();
    writer.write(&warn).unwrap();
    assert!(sink.writes().is_empty());

    writer.write(&error).unwrap();

    assert_eq!(sink.writes(), vec![[info, warn].concat(), error]);
    assert!(writer.is_flushed());
}

#[test]
fn test_fatal_and_panic_count_as_errors() {
    for level in ["fatal", "panic"] {
        let (sink, writer) = writer_with(config(0.0));
        writer.write(&line(level, "dead")).unwrap();
        assert_eq!(sink.writes().len(), 1, "level {}", level);
    }
}

#[test]
fn test_flush_on_warn() {
    let (sink, writer) = writer_with(BufferConfig {
        flush_on_warn: true,
        ..config(0.0)
    });
    writer.write(&line("debug", "ctx")).unwrap();
    writer.write(&line("warn", "careful")).unwrap();

    assert_eq!(
        sink.writes(),
        vec![line("debug", "ctx"), line("warn", "careful")]
    );
}

#[test]
fn test_error_buffered_when_flush_on_error_disabled() {
    let (sink, writer) = writer_with(BufferConfig {
        flush_on_error: false,
        ..config(0.0)
    });
    writer.write(&line("error", "quiet")).unwrap();
    assert!(sink.writes().is_empty());
    assert!(!writer.is_flushed());

    writer.finalize(false).unwrap();
    assert_eq!(sink.writes(), vec![line("error", "quiet")]);
}

#[test]
fn test_unrecognized_level_is_buffered() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(br#"{"level":"critical","message":"??"}"#).unwrap();
    writer.write(b"not json at all").unwrap();
    assert!(sink.writes().is_empty());
}

#[test]
fn test_finalize_twice_writes_once() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(&line("info", "x")).unwrap();
    writer.finalize(false).unwrap();
    writer.finalize(false).unwrap();
    writer.flush().unwrap();
    assert_eq!(sink.writes().len(), 1);
}

#[test]
fn test_flush_then_finalize_does_not_duplicate() {
    let (sink, writer) = writer_with(config(0.0));
    writer.write(&line("info", "x")).unwrap();
    writer.flush().unwrap();
    writer.finalize(false).unwrap();
    assert_eq!(sink.writes(), vec![line("info", "x")]);
}

#[test]
fn test_buffering_disabled_writes_immediately() {
    let (sink, writer) = writer_with(BufferConfig {
        buffering_enabled: false,
        ..config(0.0)
    });
    writer.write(&line("debug", "now")).unwrap();
    assert_eq!(sink.writes(), vec![line("debug", "now")]);
    writer.finalize(true).unwrap();
    assert_eq!(sink.writes().len(), 1);
}

#[test]
fn test_downstream_failure_surfaces_and_clears_buffer() {
    let stats = Arc::new(BufferStats::new());
    let writer = BufferingWriter::new(Arc::new(FailingSink), config(0.0), "r")
        .with_stats(stats.clone());
    writer.write(&line("info", "a")).unwrap();

    let err = writer.write(&line("error", "b")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(writer.buffered_len(), 0);
    assert!(writer.is_flushed());
    // Both the buffered prefix and the error record were attempted
    assert_eq!(stats.write_errors(), 2);
}

/// Fails its first write, then records the rest.
#[derive(Default)]
struct FlakySink {
    failed: Mutex<bool>,
    inner: RecordingSink,
}

impl LogSink for FlakySink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut failed = self.failed.lock().unwrap();
        if !*failed {
            *failed = true;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "hiccup"));
        }
        self.inner.write(buf)
    }
}

#[test]
fn test_trigger_record_is_forwarded_when_buffer_write_fails() {
    let sink = Arc::new(FlakySink::default());
    let writer = BufferingWriter::new(sink.clone(), config(0.0), "flaky");
    writer.write(&line("info", "ctx")).unwrap();

    let err = writer.write(&line("error", "the-error")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);

    // The lost prefix is not retried, but the error line itself got through
    assert_eq!(sink.inner.writes(), vec![line("error", "the-error")]);
    assert_eq!(writer.buffered_len(), 0);

    writer.write(&line("debug", "later")).unwrap();
    assert_eq!(sink.inner.writes().len(), 2);
}

#[test]
fn test_request_id_is_kept() {
    let (_, writer) = writer_with(config(0.0));
    assert_eq!(writer.request_id(), "test-request");
}

#[test]
fn test_finalize_failure_surfaces_error() {
    let writer = BufferingWriter::new(Arc::new(FailingSink), config(0.0), "r");
    writer.write(&line("info", "a")).unwrap();
    assert!(writer.finalize(false).is_err());
    assert_eq!(writer.buffered_len(), 0);
    // Not retried
    assert!(writer.finalize(false).is_ok());
}

#[test]
fn test_outcomes_are_recorded() {
    let stats = Arc::new(BufferStats::new());
    let sink: Arc<dyn LogSink> = Arc::new(RecordingSink::default());
    let make = |cfg: BufferConfig| {
        BufferingWriter::new(sink.clone(), cfg, "r").with_stats(stats.clone())
    };

    let w = make(config(0.0));
    w.write(&line("error", "e")).unwrap();
    w.finalize(false).unwrap();

    let w = make(config(0.0));
    w.write(&line("info", "i")).unwrap();
    w.finalize(true).unwrap();

    let w = make(config(100.0));
    w.finalize(true).unwrap();

    let w = make(config(0.0));
    w.finalize(false).unwrap();

    let w = make(config(0.0));
    w.flush().unwrap();
    w.flush().unwrap();

    assert_eq!(stats.count(Outcome::FlushedOnError), 1);
    assert_eq!(stats.count(Outcome::Discarded), 1);
    assert_eq!(stats.count(Outcome::PersistedBySampling), 1);
    assert_eq!(stats.count(Outcome::PersistedOnFailure), 1);
    assert_eq!(stats.count(Outcome::FlushedExplicitly), 1);
}

#[test]
fn test_concurrent_writes_persist_every_record_once() {
    let sink = Arc::new(RecordingSink::default());
    let writer = Arc::new(BufferingWriter::new(
        sink.clone(),
        BufferConfig {
            buffer_size: 1 << 20,
            ..config(0.0)
        },
        "concurrent",
    ));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for i in 0..100 {
                    writer.write(&line("info", &format!("t{}-{}", t, i))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    writer.finalize(false).unwrap();

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    let text = sink.concatenated();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 800);
    let unique: HashSet<_> = lines.iter().collect();
    assert_eq!(unique.len(), 800);

    // Per-thread order is preserved
    for t in 0..8 {
        let prefix = format!("\"t{}-", t);
        let seq: Vec<usize> = lines
            .iter()
            .filter(|l| l.contains(&prefix))
            .map(|l| {
                let start = l.find(&prefix).unwrap() + prefix.len();
                let end = l[start..].find('"').unwrap() + start;
                l[start..end].parse().unwrap()
            })
            .collect();
        assert_eq!(seq, (0..100).collect::<Vec<_>>());
    }
}

#[test]
fn test_concurrent_error_flushes_buffer_exactly_once() {
    let sink = Arc::new(RecordingSink::default());
    let writer = Arc::new(BufferingWriter::new(sink.clone(), config(0.0), "racy"));
    for i in 0..10 {
        writer.write(&line("info", &format!("pre-{}", i))).unwrap();
    }

    // Several threads race to trigger the flush
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                writer.write(&line("error", &format!("err-{}", t))).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    writer.finalize(true).unwrap();

    let text = sink.concatenated();
    let pre_count = text.lines().filter(|l| l.contains("pre-")).count();
    let err_count = text.lines().filter(|l| l.contains("err-")).count();
    assert_eq!(pre_count, 10);
    assert_eq!(err_count, 8);
    // The buffered prefix arrives first, as one write
    assert!(sink.writes()[0].starts_with(&line("info", "pre-0")));
}
