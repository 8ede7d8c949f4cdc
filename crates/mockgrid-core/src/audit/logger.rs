//! Audit sinks: file-backed NDJSON, stdout, no-op, and the fan-out
//! multi-writer.

use crate::audit::AuditEntry;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A destination for audit entries.
///
/// `log` assigns the sink's own sequence number before writing. `close` is
/// idempotent; logging after close fails with the logger-closed error.
pub trait AuditLogger: Send + Sync {
    /// Write one entry.
    fn log(&self, entry: AuditEntry) -> Result<()>;
    /// Flush and release the sink.
    fn close(&self) -> Result<()>;
}

struct SinkState<W> {
    writer: Option<W>,
    sequence: u64,
}

/// Newline-delimited JSON sink backed by a file, flushed on every write.
pub struct FileAuditLogger {
    path: PathBuf,
    state: Mutex<SinkState<File>>,
}

impl FileAuditLogger {
    /// Open (appending) or create the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(SinkState {
                writer: Some(file),
                sequence: 0,
            }),
        })
    }

    /// File this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLogger for FileAuditLogger {
    fn log(&self, mut entry: AuditEntry) -> Result<()> {
        let mut state = self.state.lock();
        let next = state.sequence + 1;
        {
            let Some(writer) = state.writer.as_mut() else {
                return Err(Error::LoggerClosed);
            };
            entry.sequence = next;
            let line = serde_json::to_string(&entry)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        state.sequence = next;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "audit file sink closed");
        }
        Ok(())
    }
}

/// NDJSON sink writing to standard output.
pub struct StdoutAuditLogger {
    state: Mutex<SinkState<std::io::Stdout>>,
}

impl StdoutAuditLogger {
    /// Create a stdout sink.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                writer: Some(std::io::stdout()),
                sequence: 0,
            }),
        }
    }
}

impl Default for StdoutAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger for StdoutAuditLogger {
    fn log(&self, mut entry: AuditEntry) -> Result<()> {
        let mut state = self.state.lock();
        let next = state.sequence + 1;
        {
            let Some(writer) = state.writer.as_mut() else {
                return Err(Error::LoggerClosed);
            };
            entry.sequence = next;
            let line = serde_json::to_string(&entry)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        state.sequence = next;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().writer.take();
        Ok(())
    }
}

/// Sink that drops every entry; the default when capture is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _entry: AuditEntry) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Aggregated failure from a fan-out write.
///
/// Every child sink still received the entry; this error reports every
/// underlying cause and supports structural containment queries.
#[derive(Debug)]
pub struct FanoutError {
    causes: Vec<Error>,
}

impl FanoutError {
    /// The underlying sink errors, in sink order.
    pub fn causes(&self) -> &[Error] {
        &self.causes
    }

    /// Whether any cause (recursing through nested fan-outs) matches.
    pub fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Error) -> bool + Copy,
    {
        self.causes.iter().any(|cause| match cause {
            Error::Fanout(nested) => predicate(cause) || nested.contains(predicate),
            other => predicate(other),
        })
    }

    /// Whether any cause is the logger-closed error.
    pub fn contains_closed(&self) -> bool {
        self.contains(|e| matches!(e, Error::LoggerClosed))
    }
}

impl fmt::Display for FanoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sink error(s): ", self.causes.len())?;
        for (index, cause) in self.causes.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FanoutError {}

/// Fans every entry out to all child sinks.
pub struct MultiAuditLogger {
    sinks: Vec<Arc<dyn AuditLogger>>,
}

impl MultiAuditLogger {
    /// Combine several sinks into one.
    pub fn new(sinks: Vec<Arc<dyn AuditLogger>>) -> Self {
        Self { sinks }
    }

    /// Number of child sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no child sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditLogger for MultiAuditLogger {
    fn log(&self, entry: AuditEntry) -> Result<()> {
        let mut causes = Vec::new();
        for sink in &self.sinks {
            // Every child gets the entry even when earlier ones failed.
            if let Err(e) = sink.log(entry.clone()) {
                causes.push(e);
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            Err(Error::Fanout(FanoutError { causes }))
        }
    }

    fn close(&self) -> Result<()> {
        let mut causes = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.close() {
                causes.push(e);
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            Err(Error::Fanout(FanoutError { causes }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use tempfile::TempDir;

    fn entry(trace: &str) -> AuditEntry {
        AuditEntry::new(trace, AuditEvent::RequestReceived)
    }

    struct FailingSink;

    impl AuditLogger for FailingSink {
        fn log(&self, _entry: AuditEntry) -> Result<()> {
            Err(Error::LoggerClosed)
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Records every entry it receives, for fan-out assertions.
    struct RecordingSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }
    }

    impl AuditLogger for RecordingSink {
        fn log(&self, entry: AuditEntry) -> Result<()> {
            self.entries.lock().push(entry);
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_file_sink_writes_ndjson_with_increasing_sequences() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("audit.ndjson");
        let sink = FileAuditLogger::new(&path).expect("open");

        sink.log(entry("t1")).expect("log");
        sink.log(entry("t1")).expect("log");
        sink.log(entry("t2")).expect("log");
        sink.close().expect("close");

        let contents = std::fs::read_to_string(&path).expect("read");
        let sequences: Vec<u64> = contents
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).expect("json line");
                value["sequence"].as_u64().expect("sequence")
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_close_is_idempotent_and_log_after_close_fails() {
        let dir = TempDir::new().expect("tempdir");
        let sink = FileAuditLogger::new(dir.path().join("audit.ndjson")).expect("open");

        sink.close().expect("close");
        sink.close().expect("second close is a no-op");

        let err = sink.log(entry("t")).expect_err("closed");
        assert!(matches!(err, Error::LoggerClosed));
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let sink = NoopAuditLogger;
        sink.log(entry("t")).expect("log");
        sink.close().expect("close");
        sink.close().expect("close again");
    }

    #[test]
    fn test_multi_writer_reaches_every_child_despite_failures() {
        let recorder = Arc::new(RecordingSink::new());
        let multi = MultiAuditLogger::new(vec![
            Arc::new(FailingSink),
            recorder.clone(),
            Arc::new(FailingSink),
        ]);

        let err = multi.log(entry("t")).expect_err("aggregated failure");
        // The healthy sink still received the entry.
        assert_eq!(recorder.entries.lock().len(), 1);

        match err {
            Error::Fanout(fanout) => {
                assert_eq!(fanout.causes().len(), 2);
                assert!(fanout.contains_closed());
                assert!(!fanout.contains(|e| matches!(e, Error::Cancelled)));
                assert!(fanout.to_string().contains("2 sink error(s)"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multi_writer_all_healthy() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let multi = MultiAuditLogger::new(vec![a.clone(), b.clone()]);
        multi.log(entry("t")).expect("log");
        assert_eq!(a.entries.lock().len(), 1);
        assert_eq!(b.entries.lock().len(), 1);
    }
}
