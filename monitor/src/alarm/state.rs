use tracing::{debug, info};

use crate::detector::MotionScore;

/// Score above which motion is asserted, matching the reference detector.
pub const DEFAULT_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    /// No motion above threshold.
    Idle,
    /// Motion currently asserted. Level-triggered: held for as long as the
    /// score stays above threshold.
    Alarm,
}

/// Control-surface flags, read once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFlags {
    pub alarm_enabled: bool,
    pub logging_enabled: bool,
}

/// Directives produced by one [`AlarmStateMachine::step`]. The caller
/// performs the playback and logging side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Step {
    /// `None` until the first score has been seen.
    pub state: Option<AlarmState>,
    pub play_alarm: bool,
    /// Pause and rewind the alarm.
    pub stop_alarm: bool,
    pub log: bool,
}

pub struct AlarmStateMachine {
    state: Option<AlarmState>, // None = no score seen yet
    threshold: f64,
}

impl AlarmStateMachine {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: None,
            threshold,
        }
    }

    pub fn state(&self) -> Option<AlarmState> {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Advance one frame cycle.
    ///
    /// `playing` is the alarm device's report of whether it is currently
    /// sounding; it only suppresses redundant `play_alarm` directives.
    /// A cycle without a score (first frame, skipped frame) changes nothing.
    pub fn step(&mut self, score: Option<MotionScore>, flags: AlarmFlags, playing: bool) -> Step {
        let Some(score) = score else {
            return Step {
                state: self.state,
                ..Step::default()
            };
        };

        let target = if score.value() > self.threshold {
            AlarmState::Alarm
        } else {
            AlarmState::Idle
        };

        match (self.state, target) {
            (Some(AlarmState::Alarm), AlarmState::Alarm)
            | (Some(AlarmState::Idle), AlarmState::Idle) => {
                debug!(%score, threshold = self.threshold, state = ?target, "state held");
            }
            (None, AlarmState::Idle) => {
                debug!(
                    %score,
                    threshold = self.threshold,
                    "first score below threshold, entering IDLE"
                );
            }
            (_, AlarmState::Alarm) => {
                info!(%score, threshold = self.threshold, "IDLE→ALARM: motion detected");
            }
            (_, AlarmState::Idle) => {
                info!(%score, threshold = self.threshold, "ALARM→IDLE: motion ended");
            }
        }
        self.state = Some(target);

        match target {
            AlarmState::Alarm => Step {
                state: self.state,
                play_alarm: flags.alarm_enabled && !playing,
                stop_alarm: false,
                log: flags.logging_enabled,
            },
            AlarmState::Idle => Step {
                state: self.state,
                play_alarm: false,
                stop_alarm: true,
                log: false,
            },
        }
    }
}
