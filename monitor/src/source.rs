use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

use chrono::Utc;
use image::imageops::FilterType;
use image::ImageReader;
use motion_watch_common::config::SourceConfig;
use motion_watch_common::frame::{FrameBuffer, FrameError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("frame source is closed")]
    Closed,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Supplies frames to the monitor, one per tick.
pub trait FrameSource {
    fn next_frame(&mut self) -> impl Future<Output = Result<FrameBuffer, SourceError>> + Send;

    /// Release the underlying device. Later calls to `next_frame` fail.
    fn close(&mut self) {}
}

/// Polls a camera URL that returns one still image per request.
///
/// Every frame is resized to the configured dimensions and converted to
/// RGB, so the monitor always sees equally sized buffers.
pub struct HttpSnapshotSource {
    client: Option<reqwest::Client>,
    url: String,
    width: u32,
    height: u32,
    seq: u64,
}

impl HttpSnapshotSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client: Some(client),
            url: config.url.clone(),
            width: config.width,
            height: config.height,
            seq: 0,
        })
    }

    fn decode(
        &self,
        body: &[u8],
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<FrameBuffer, SourceError> {
        let img = ImageReader::new(Cursor::new(body))
            .with_guessed_format()
            .map_err(|e| SourceError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let rgb = if img.width() == self.width && img.height() == self.height {
            img.to_rgb8()
        } else {
            img.resize_exact(self.width, self.height, FilterType::Triangle)
                .to_rgb8()
        };
        Ok(FrameBuffer::new(
            self.width,
            self.height,
            3,
            rgb.into_raw(),
            captured_at_ms,
            seq,
        )?)
    }
}

impl FrameSource for HttpSnapshotSource {
    async fn next_frame(&mut self) -> Result<FrameBuffer, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::Closed)?;
        let resp = client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::HttpStatus(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        let captured_at_ms = Utc::now().timestamp_millis();

        let seq = self.seq;
        self.seq += 1;
        let frame = self.decode(&body, captured_at_ms, seq)?;
        debug!(seq, bytes = body.len(), "frame captured");
        Ok(frame)
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!(url = self.url, "frame source closed");
        }
    }
}
