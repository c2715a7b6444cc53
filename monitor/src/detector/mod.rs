pub mod motion;

pub use motion::{MotionDetector, MotionScore};
