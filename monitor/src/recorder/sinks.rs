use std::time::Duration;

use bytes::Bytes;
use motion_watch_common::config::{EmailConfig, UploadConfig};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::keys::snapshot_key;
use super::log::LogEntry;

const UPLOAD_PREFIX: &str = "motion/";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("no tokio runtime available to deliver the notification")]
    NoRuntime,
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("notification rejected: {0}")]
    Rejected(String),
    #[error("upload queue is full, snapshot dropped")]
    QueueFull,
    #[error("upload worker has stopped")]
    WorkerStopped,
}

/// Receiver of logged motion events.
///
/// Delivery is fire-and-forget: `notify` must not block the monitor loop.
/// Slow work (network I/O) belongs in a spawned task.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Emits an alert record for each event. Stands in for a mail relay: the
/// record carries the recipient and timestamp a mailer would need.
pub struct EmailAlertSink {
    recipient: String,
}

impl EmailAlertSink {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            recipient: config.recipient.clone(),
        }
    }
}

impl NotificationSink for EmailAlertSink {
    fn notify(&self, entry: &LogEntry) -> Result<(), SinkError> {
        if self.recipient.is_empty() {
            return Err(SinkError::Rejected("no recipient configured".into()));
        }
        warn!(
            recipient = self.recipient,
            timestamp = entry.timestamp,
            seq = entry.seq,
            image_bytes = entry.image.bytes.len(),
            "EMAIL ALERT: motion detected"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}

/// One snapshot waiting for upload.
struct Upload {
    seq: u64,
    key: String,
    timestamp: String,
    content_type: &'static str,
    body: Bytes,
}

/// Uploads each snapshot with an HTTP POST.
///
/// `notify` only enqueues. A single worker task drains the bounded queue, so
/// at most one upload is in flight and a stalled endpoint costs dropped
/// snapshots rather than unbounded tasks.
pub struct HttpUploadSink {
    queue: mpsc::Sender<Upload>,
}

impl HttpUploadSink {
    /// Must be called inside a tokio runtime, which hosts the upload worker.
    pub fn new(config: &UploadConfig) -> Result<Self, SinkError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SinkError::Client)?;
        let (queue, rx) = mpsc::channel(config.queue_depth.max(1));
        handle.spawn(upload_worker(client, config.url.clone(), rx));
        Ok(Self { queue })
    }
}

async fn upload_worker(client: reqwest::Client, url: String, mut rx: mpsc::Receiver<Upload>) {
    while let Some(upload) = rx.recv().await {
        let seq = upload.seq;
        let result = client
            .post(&url)
            .header(CONTENT_TYPE, upload.content_type)
            .header("x-motion-timestamp", upload.timestamp)
            .header("x-motion-key", upload.key)
            .body(upload.body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(seq, status = %resp.status(), "snapshot uploaded");
            }
            Ok(resp) => {
                warn!(seq, status = %resp.status(), "snapshot upload rejected");
            }
            Err(e) => {
                warn!(seq, error = %e, "snapshot upload failed");
            }
        }
    }
    debug!("upload queue closed, worker exiting");
}

impl NotificationSink for HttpUploadSink {
    fn notify(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let upload = Upload {
            seq: entry.seq,
            key: snapshot_key(UPLOAD_PREFIX, entry.captured_at_ms, entry.seq),
            timestamp: entry.timestamp.clone(),
            content_type: entry.image.content_type,
            body: entry.image.bytes.clone(),
        };
        self.queue.try_send(upload).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::QueueFull,
            TrySendError::Closed(_) => SinkError::WorkerStopped,
        })
    }

    fn name(&self) -> &str {
        "upload"
    }
}
