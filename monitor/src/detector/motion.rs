use motion_watch_common::frame::{FrameBuffer, Zone};
use tracing::debug;

/// Mean per-pixel RGB difference between two frames. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MotionScore(f64);

impl MotionScore {
    pub const ZERO: MotionScore = MotionScore(0.0);

    /// Negative and NaN inputs clamp to zero.
    pub fn new(value: f64) -> Self {
        Self(value.max(0.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for MotionScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("frame shape changed from {prev_w}x{prev_h}x{prev_c} to {cur_w}x{cur_h}x{cur_c}")]
    DimensionMismatch {
        prev_w: u32,
        prev_h: u32,
        prev_c: u8,
        cur_w: u32,
        cur_h: u32,
        cur_c: u8,
    },
}

/// Frame-differencing motion detector.
///
/// Sums `|ΔR| + |ΔG| + |ΔB|` over every pixel of the scanned region and
/// divides by the pixel count of the *whole* frame, so a small zone needs
/// proportionally more change to reach the same score.
#[derive(Debug, Default, Clone, Copy)]
pub struct MotionDetector;

impl MotionDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        previous: &FrameBuffer,
        current: &FrameBuffer,
        zone: Option<&Zone>,
    ) -> Result<MotionScore, DetectError> {
        if !previous.same_shape(current) {
            return Err(DetectError::DimensionMismatch {
                prev_w: previous.width(),
                prev_h: previous.height(),
                prev_c: previous.channels(),
                cur_w: current.width(),
                cur_h: current.height(),
                cur_c: current.channels(),
            });
        }

        let zone = zone
            .copied()
            .unwrap_or_else(|| Zone::full_frame(current.width(), current.height()));
        let Some(region) = zone.clamp_to(current.width(), current.height()) else {
            debug!(?zone, "zone lies outside the frame, scoring zero");
            return Ok(MotionScore::ZERO);
        };

        let channels = current.channels() as usize;
        let x1 = region.x + region.width;
        let mut total: u64 = 0;
        for y in region.y..region.y + region.height {
            let prev_row = previous.row_span(y, region.x, x1);
            let cur_row = current.row_span(y, region.x, x1);
            for (p, c) in prev_row
                .chunks_exact(channels)
                .zip(cur_row.chunks_exact(channels))
            {
                total += p[0].abs_diff(c[0]) as u64
                    + p[1].abs_diff(c[1]) as u64
                    + p[2].abs_diff(c[2]) as u64;
            }
        }

        Ok(MotionScore::new(
            total as f64 / current.pixel_count() as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, channels: u8, value: u8) -> FrameBuffer {
        let len = (width * height * channels as u32) as usize;
        FrameBuffer::new(width, height, channels, vec![value; len], 0, 0).unwrap()
    }

    fn with_pixel(base: &FrameBuffer, x: u32, y: u32, rgb: [u8; 3]) -> FrameBuffer {
        let mut data = base.data().to_vec();
        let c = base.channels() as usize;
        let i = (y as usize * base.width() as usize + x as usize) * c;
        data[i..i + 3].copy_from_slice(&rgb);
        FrameBuffer::new(base.width(), base.height(), base.channels(), data, 0, 0).unwrap()
    }

    #[test]
    fn identical_frames_score_zero() {
        let a = solid(8, 6, 3, 77);
        let b = a.clone();
        let d = MotionDetector::new();
        assert_eq!(d.score(&a, &b, None).unwrap(), MotionScore::ZERO);
        assert_eq!(
            d.score(&a, &b, Some(&Zone::new(2, 2, 3, 3))).unwrap(),
            MotionScore::ZERO
        );
    }

    #[test]
    fn score_is_mean_channel_sum_over_frame() {
        // 4 pixels, one pixel changes by 10 in each of R, G, B -> 30 / 4
        let a = solid(2, 2, 3, 0);
        let b = with_pixel(&a, 1, 1, [10, 10, 10]);
        let score = MotionDetector::new().score(&a, &b, None).unwrap();
        assert_eq!(score.value(), 7.5);
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let a = solid(2, 2, 4, 0);
        let mut data = a.data().to_vec();
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        let b = FrameBuffer::new(2, 2, 4, data, 0, 0).unwrap();
        assert_eq!(
            MotionDetector::new().score(&a, &b, None).unwrap(),
            MotionScore::ZERO
        );
    }

    #[test]
    fn full_frame_zone_matches_no_zone() {
        let a = solid(5, 4, 3, 20);
        let b = with_pixel(&with_pixel(&a, 0, 0, [200, 0, 90]), 4, 3, [1, 2, 3]);
        let d = MotionDetector::new();
        assert_eq!(
            d.score(&a, &b, None).unwrap(),
            d.score(&a, &b, Some(&Zone::full_frame(5, 4))).unwrap()
        );
        // (180 + 20 + 70) + (19 + 18 + 17) over 20 pixels
        assert_eq!(d.score(&a, &b, None).unwrap().value(), 324.0 / 20.0);
    }

    #[test]
    fn zone_excludes_outside_changes_but_keeps_frame_normalization() {
        let a = solid(4, 4, 3, 0);
        // inside the zone
        let b = with_pixel(&a, 1, 1, [40, 0, 0]);
        // outside the zone
        let b = with_pixel(&b, 3, 3, [255, 255, 255]);
        let zone = Zone::new(0, 0, 2, 2);
        let score = MotionDetector::new().score(&a, &b, Some(&zone)).unwrap();
        // 40 over 16 frame pixels, not over the 4 zone pixels
        assert_eq!(score.value(), 2.5);
    }

    #[test]
    fn negative_zone_scores_like_its_normalized_form() {
        let a = solid(6, 6, 3, 10);
        let b = with_pixel(&a, 2, 2, [90, 90, 90]);
        let d = MotionDetector::new();
        assert_eq!(
            d.score(&a, &b, Some(&Zone::new(4, 4, -3, -3))).unwrap(),
            d.score(&a, &b, Some(&Zone::new(1, 1, 3, 3))).unwrap()
        );
    }

    #[test]
    fn zone_outside_frame_scores_zero() {
        let a = solid(4, 4, 3, 0);
        let b = solid(4, 4, 3, 255);
        let score = MotionDetector::new()
            .score(&a, &b, Some(&Zone::new(10, 10, 5, 5)))
            .unwrap();
        assert_eq!(score, MotionScore::ZERO);
    }

    #[test]
    fn larger_differences_never_lower_the_score() {
        let a = solid(3, 3, 3, 100);
        let zone = Zone::new(0, 0, 2, 2);
        let d = MotionDetector::new();
        let mut last = MotionScore::ZERO;
        for delta in [0u8, 5, 20, 60, 155] {
            let b = with_pixel(&a, 1, 0, [100 + delta, 100, 100 - delta.min(100)]);
            let score = d.score(&a, &b, Some(&zone)).unwrap();
            assert!(score >= last, "delta {delta}: {score} < {last}");
            last = score;
        }
    }

    #[test]
    fn shape_change_is_reported() {
        let a = solid(4, 4, 3, 0);
        let b = solid(4, 2, 3, 0);
        let c = solid(4, 4, 4, 0);
        let d = MotionDetector::new();
        assert!(matches!(
            d.score(&a, &b, None),
            Err(DetectError::DimensionMismatch { .. })
        ));
        assert!(d.score(&a, &c, None).is_err());
    }
}
