use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// A captured camera frame as raw interleaved samples.
///
/// Layout: row-major, `channels` samples per pixel (3 = RGB, 4 = RGBA).
/// Only the first three channels take part in motion scoring; the 4th
/// (alpha) is carried but ignored.
///
/// A frame is immutable once captured. Each processing cycle produces a new
/// instance and the driver keeps at most one previous frame around.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl FrameBuffer {
    /// Build a frame, validating that `data` matches `width * height * channels`.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        if channels != 3 && channels != 4 {
            return Err(FrameError::UnsupportedChannels(channels));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            captured_at_ms,
            seq,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of pixels in the whole frame.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when both frames have identical width, height and sample layout.
    pub fn same_shape(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    /// Samples for row `y`, restricted to columns `x0..x1`.
    pub fn row_span(&self, y: u32, x0: u32, x1: u32) -> &[u8] {
        let stride = self.width as usize * self.channels as usize;
        let start = y as usize * stride + x0 as usize * self.channels as usize;
        let end = y as usize * stride + x1 as usize * self.channels as usize;
        &self.data[start..end]
    }

    /// Copy the frame out as packed RGB, dropping a 4th channel if present.
    pub fn to_rgb(&self) -> Vec<u8> {
        if self.channels == 3 {
            return self.data.clone();
        }
        self.data
            .chunks_exact(self.channels as usize)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    /// Capture time in the local timezone.
    pub fn captured_at(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt(self.captured_at_ms)
            .single()
            .unwrap_or_else(Local::now)
    }
}

/// Rectangular region of interest as drawn by the user.
///
/// Width and height may be negative (the rectangle was dragged up or left).
/// Call [`Zone::normalized`] or [`Zone::clamp_to`] before using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Zone {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Zone covering a whole `width x height` frame.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self::new(
            0,
            0,
            width.min(i32::MAX as u32) as i32,
            height.min(i32::MAX as u32) as i32,
        )
    }

    /// Same rectangle with a non-negative extent and the origin moved to the
    /// top-left corner.
    pub fn normalized(&self) -> Zone {
        let (x, width) = normalize_axis(self.x, self.width);
        let (y, height) = normalize_axis(self.y, self.height);
        Zone {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect the normalized zone with a `frame_width x frame_height`
    /// frame. Returns `None` when nothing of the zone lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let z = self.normalized();
        let x0 = (z.x as i64).max(0);
        let y0 = (z.y as i64).max(0);
        let x1 = (z.x as i64 + z.width as i64).min(frame_width as i64);
        let y1 = (z.y as i64 + z.height as i64).min(frame_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Region {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

fn normalize_axis(origin: i32, extent: i32) -> (i32, i32) {
    if extent < 0 {
        (origin.saturating_add(extent), extent.saturating_neg())
    } else {
        (origin, extent)
    }
}

/// An in-bounds, non-empty pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has empty dimensions {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("unsupported channel count {0}, expected 3 or 4")]
    UnsupportedChannels(u8),
    #[error("frame data is {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },
}
