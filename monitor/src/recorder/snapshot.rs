use std::io::Cursor;

use bytes::Bytes;
use image::{ImageFormat, RgbImage};
use motion_watch_common::frame::FrameBuffer;

/// An encoded still image.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl EncodedImage {
    pub fn png(bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: "image/png",
            bytes: bytes.into(),
        }
    }

    /// Placeholder used when encoding failed.
    pub fn empty() -> Self {
        Self::png(Bytes::new())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("frame buffer does not form a valid RGB image")]
    InvalidBuffer,
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Encode the frame as PNG, dropping any alpha channel.
pub fn encode_png(frame: &FrameBuffer) -> Result<EncodedImage, SnapshotError> {
    let img = RgbImage::from_raw(frame.width(), frame.height(), frame.to_rgb())
        .ok_or(SnapshotError::InvalidBuffer)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(EncodedImage::png(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_decodable_png() {
        let mut data = vec![0u8; 4 * 3 * 4];
        data[0] = 255;
        let frame = FrameBuffer::new(4, 3, 4, data, 0, 0).unwrap();
        let encoded = encode_png(&frame).unwrap();
        assert_eq!(encoded.content_type, "image/png");
        assert_eq!(&encoded.bytes[..4], b"\x89PNG");

        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn empty_image_is_empty() {
        assert!(EncodedImage::empty().is_empty());
    }
}
