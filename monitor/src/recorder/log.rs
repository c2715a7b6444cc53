use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tracing::{info, warn};

use super::sinks::NotificationSink;
use super::snapshot::EncodedImage;

/// One logged motion event.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub captured_at_ms: i64,
    /// Local wall-clock time, formatted for humans.
    pub timestamp: String,
    pub image: EncodedImage,
    /// Raw RGB samples of the frame, when raw capture is enabled.
    pub raw: Option<Bytes>,
}

/// Append-only, insertion-ordered event log shared with the control API.
#[derive(Clone, Default)]
pub struct LogBook {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn get(&self, seq: u64) -> Option<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(seq).ok().and_then(|i| entries.get(i).cloned())
    }

    /// Project every entry, in log order, without cloning the entries.
    pub fn map<T>(&self, f: impl FnMut(&LogEntry) -> T) -> Vec<T> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(f)
            .collect()
    }

    fn push(&self, build: impl FnOnce(u64) -> LogEntry) -> LogEntry {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = build(entries.len() as u64);
        entries.push(entry.clone());
        entry
    }
}

/// Records motion events and fans them out to notification sinks.
pub struct LogRecorder {
    book: LogBook,
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl LogRecorder {
    pub fn new(book: LogBook) -> Self {
        Self {
            book,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn book(&self) -> &LogBook {
        &self.book
    }

    /// Append one entry. `snapshot` is invoked now to capture the frame.
    ///
    /// Sink failures are logged and dropped; the entry is always recorded.
    pub fn append(
        &self,
        timestamp: String,
        captured_at_ms: i64,
        snapshot: impl FnOnce() -> EncodedImage,
        raw: Option<Bytes>,
    ) -> LogEntry {
        let image = snapshot();
        let entry = self.book.push(|seq| LogEntry {
            seq,
            captured_at_ms,
            timestamp,
            image,
            raw,
        });

        info!(
            seq = entry.seq,
            timestamp = entry.timestamp,
            image_bytes = entry.image.bytes.len(),
            "motion event logged"
        );

        for sink in &self.sinks {
            if let Err(e) = sink.notify(&entry) {
                warn!(sink = sink.name(), seq = entry.seq, error = %e, "notification sink failed");
            }
        }

        entry
    }
}
