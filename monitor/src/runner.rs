use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use motion_watch_common::config::Config;
use motion_watch_common::frame::FrameBuffer;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alarm::{AlarmDevice, AlarmStateMachine, Step};
use crate::controls::Controls;
use crate::detector::{MotionDetector, MotionScore};
use crate::recorder::{encode_png, EncodedImage, LogRecorder};
use crate::source::FrameSource;

/// Static monitor settings, fixed for the session.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub threshold: f64,
    pub tick: Duration,
    pub timestamp_format: String,
    pub keep_raw: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.detection.threshold,
            tick: Duration::from_secs_f64(1.0 / config.monitor.fps),
            timestamp_format: config.recorder.timestamp_format.clone(),
            keep_raw: config.recorder.keep_raw,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No frame could be acquired.
    Skipped,
    /// Frame stored as the comparison baseline, nothing scored.
    Baseline,
    Scored { score: MotionScore, step: Step },
}

/// Drives the detection loop: acquire, score, step, act.
///
/// Owns the previous frame. Ticks run strictly one after another on the
/// calling task.
pub struct Monitor<S> {
    source: S,
    alarm: Box<dyn AlarmDevice>,
    detector: MotionDetector,
    machine: AlarmStateMachine,
    recorder: LogRecorder,
    controls: Arc<Controls>,
    settings: MonitorSettings,
    previous: Option<FrameBuffer>,
    frames: u64,
}

impl<S: FrameSource> Monitor<S> {
    pub fn new(
        source: S,
        alarm: Box<dyn AlarmDevice>,
        recorder: LogRecorder,
        controls: Arc<Controls>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            alarm,
            detector: MotionDetector::new(),
            machine: AlarmStateMachine::new(settings.threshold),
            recorder,
            controls,
            settings,
            previous: None,
            frames: 0,
        }
    }

    /// Run until `shutdown` turns true (or its sender goes away), then
    /// silence the alarm and release the frame source.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_ms = self.settings.tick.as_millis() as u64,
            threshold = self.machine.threshold(),
            alarm = self.alarm.name(),
            "monitoring started"
        );
        self.controls.update_status(|s| s.running = true);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            self.tick().await;
        }

        self.stop();
    }

    /// Acquire one frame and process it. A failed acquisition is a no-op.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.source.next_frame().await {
            Ok(frame) => self.process_frame(frame),
            Err(e) => {
                warn!(error = %e, "failed to acquire frame, skipping tick");
                TickOutcome::Skipped
            }
        }
    }

    /// Score `frame` against the previous one and apply the resulting
    /// directives. `frame` becomes the next baseline.
    pub fn process_frame(&mut self, frame: FrameBuffer) -> TickOutcome {
        self.frames += 1;
        let flags = self.controls.flags();
        let zone = self.controls.zone();

        let score = match self.previous.take() {
            None => None,
            Some(prev) => match self.detector.score(&prev, &frame, zone.as_ref()) {
                Ok(score) => Some(score),
                Err(e) => {
                    warn!(error = %e, "frame shape changed, resetting baseline");
                    None
                }
            },
        };

        let playing = self.alarm.is_playing();
        let step = self.machine.step(score, flags, playing);

        if step.play_alarm {
            if let Err(e) = self.alarm.play() {
                warn!(device = self.alarm.name(), error = %e, "failed to start alarm");
            }
        }
        if step.stop_alarm {
            self.silence();
        }
        if step.log {
            self.log_event(&frame);
        }

        if let Some(score) = score {
            debug!(seq = frame.seq, %score, state = ?step.state, "frame processed");
        }
        let frames = self.frames;
        self.controls.update_status(|s| {
            s.state = step.state;
            s.last_score = score;
            s.frames = frames;
        });
        self.previous = Some(frame);

        match score {
            Some(score) => TickOutcome::Scored { score, step },
            None => TickOutcome::Baseline,
        }
    }

    fn log_event(&self, frame: &FrameBuffer) {
        let mut timestamp = String::new();
        if write!(timestamp, "{}", frame.captured_at().format(&self.settings.timestamp_format))
            .is_err()
        {
            timestamp = frame.captured_at().to_rfc3339();
        }
        let raw = self
            .settings
            .keep_raw
            .then(|| Bytes::from(frame.to_rgb()));

        self.recorder.append(
            timestamp,
            frame.captured_at_ms,
            || {
                encode_png(frame).unwrap_or_else(|e| {
                    warn!(seq = frame.seq, error = %e, "failed to encode snapshot");
                    EncodedImage::empty()
                })
            },
            raw,
        );
    }

    fn silence(&mut self) {
        if let Err(e) = self.alarm.pause() {
            warn!(device = self.alarm.name(), error = %e, "failed to pause alarm");
        }
        if let Err(e) = self.alarm.reset_position() {
            warn!(device = self.alarm.name(), error = %e, "failed to rewind alarm");
        }
    }

    fn stop(&mut self) {
        self.silence();
        self.source.close();
        self.previous = None;
        self.controls.update_status(|s| s.running = false);
        info!(
            frames = self.frames,
            events = self.recorder.book().len(),
            state = ?self.machine.state(),
            "monitoring stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::device::AlarmError;
    use crate::alarm::AlarmState;
    use crate::recorder::LogBook;
    use crate::source::SourceError;
    use motion_watch_common::config::ControlsConfig;
    use motion_watch_common::frame::Zone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Source replaying a fixed script. `None` simulates a capture failure;
    /// once the script runs out every tick fails.
    struct ScriptedSource {
        frames: VecDeque<Option<FrameBuffer>>,
        closed: Arc<Mutex<bool>>,
    }

    impl FrameSource for ScriptedSource {
        async fn next_frame(&mut self) -> Result<FrameBuffer, SourceError> {
            match self.frames.pop_front() {
                Some(Some(frame)) => Ok(frame),
                Some(None) => Err(SourceError::HttpStatus(503)),
                None => Err(SourceError::Closed),
            }
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    /// Alarm that records every call.
    #[derive(Clone, Default)]
    struct RecordingAlarm {
        calls: Arc<Mutex<Vec<&'static str>>>,
        playing: Arc<Mutex<bool>>,
        fail_play: bool,
    }

    impl AlarmDevice for RecordingAlarm {
        fn play(&mut self) -> Result<(), AlarmError> {
            self.calls.lock().unwrap().push("play");
            if self.fail_play {
                return Err(AlarmError::Spawn(
                    "player".into(),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            *self.playing.lock().unwrap() = true;
            Ok(())
        }

        fn pause(&mut self) -> Result<(), AlarmError> {
            self.calls.lock().unwrap().push("pause");
            *self.playing.lock().unwrap() = false;
            Ok(())
        }

        fn reset_position(&mut self) -> Result<(), AlarmError> {
            self.calls.lock().unwrap().push("reset");
            Ok(())
        }

        fn is_playing(&mut self) -> bool {
            *self.playing.lock().unwrap()
        }
    }

    fn frame(value: u8, seq: u64) -> FrameBuffer {
        FrameBuffer::new(4, 4, 3, vec![value; 48], 1_700_000_000_000 + seq as i64, seq).unwrap()
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            threshold: 20.0,
            tick: Duration::from_millis(1),
            timestamp_format: "%Y-%m-%d %H:%M:%S".into(),
            keep_raw: false,
        }
    }

    fn controls() -> Arc<Controls> {
        Arc::new(Controls::new(&ControlsConfig::default(), None))
    }

    fn monitor(
        frames: Vec<Option<FrameBuffer>>,
        alarm: RecordingAlarm,
        controls: Arc<Controls>,
        book: LogBook,
    ) -> (Monitor<ScriptedSource>, Arc<Mutex<bool>>) {
        let closed = Arc::new(Mutex::new(false));
        let source = ScriptedSource {
            frames: frames.into(),
            closed: Arc::clone(&closed),
        };
        let monitor = Monitor::new(
            source,
            Box::new(alarm),
            LogRecorder::new(book),
            controls,
            settings(),
        );
        (monitor, closed)
    }

    #[tokio::test]
    async fn first_frame_only_sets_baseline() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let (mut m, _) = monitor(vec![Some(frame(0, 0))], alarm.clone(), controls(), book.clone());

        assert_eq!(m.tick().await, TickOutcome::Baseline);
        assert!(alarm.calls.lock().unwrap().is_empty());
        assert_eq!(book.len(), 0);
        assert_eq!(m.controls.status().state, None);
        assert_eq!(m.controls.status().last_score, None);
    }

    #[tokio::test]
    async fn motion_triggers_alarm_and_level_triggered_logging() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        // 0 -> 100 -> 0 -> 0 : two frames of motion (score 300 each), then quiet
        let frames = vec![
            Some(frame(0, 0)),
            Some(frame(100, 1)),
            Some(frame(0, 2)),
            Some(frame(0, 3)),
        ];
        let (mut m, _) = monitor(frames, alarm.clone(), controls(), book.clone());

        let mut states = Vec::new();
        for _ in 0..4 {
            if let TickOutcome::Scored { step, .. } = m.tick().await {
                states.push(step.state);
            }
        }

        assert_eq!(
            states,
            vec![
                Some(AlarmState::Alarm),
                Some(AlarmState::Alarm),
                Some(AlarmState::Idle)
            ]
        );
        assert_eq!(book.len(), 2);
        let status = m.controls.status();
        assert_eq!(status.state, Some(AlarmState::Idle));
        assert_eq!(status.last_score, Some(MotionScore::ZERO));
        assert_eq!(status.frames, 4);
        let calls = alarm.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["play", "pause", "reset"]);
        let entry = book.get(0).unwrap();
        assert_eq!(entry.captured_at_ms, 1_700_000_000_001);
        assert!(!entry.image.is_empty());
        assert!(entry.raw.is_none());
    }

    #[tokio::test]
    async fn capture_failure_skips_tick_without_transition() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let frames = vec![Some(frame(0, 0)), None, Some(frame(0, 1))];
        let (mut m, _) = monitor(frames, alarm, controls(), book);

        assert_eq!(m.tick().await, TickOutcome::Baseline);
        assert_eq!(m.tick().await, TickOutcome::Skipped);
        assert!(matches!(
            m.tick().await,
            TickOutcome::Scored { score, .. } if score == MotionScore::ZERO
        ));
    }

    #[tokio::test]
    async fn resolution_change_resets_baseline() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let bigger = FrameBuffer::new(8, 8, 3, vec![255; 192], 0, 1).unwrap();
        let bigger_again = FrameBuffer::new(8, 8, 3, vec![255; 192], 0, 2).unwrap();
        let frames = vec![Some(frame(0, 0)), Some(bigger), Some(bigger_again)];
        let (mut m, _) = monitor(frames, alarm, controls(), book.clone());

        m.tick().await;
        assert_eq!(m.tick().await, TickOutcome::Baseline);
        assert!(matches!(
            m.tick().await,
            TickOutcome::Scored { score, .. } if score == MotionScore::ZERO
        ));
        assert_eq!(book.len(), 0);
    }

    #[tokio::test]
    async fn disabled_flags_suppress_side_effects() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let controls = controls();
        controls.set_alarm_enabled(false);
        controls.set_logging_enabled(false);
        let (mut m, _) = monitor(
            vec![Some(frame(0, 0)), Some(frame(200, 1))],
            alarm.clone(),
            controls,
            book.clone(),
        );

        m.tick().await;
        let outcome = m.tick().await;
        assert!(matches!(
            outcome,
            TickOutcome::Scored { step, .. } if step.state == Some(AlarmState::Alarm)
        ));
        assert!(alarm.calls.lock().unwrap().is_empty());
        assert_eq!(book.len(), 0);
    }

    #[tokio::test]
    async fn zone_outside_frame_never_alarms() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let controls = controls();
        controls.set_zone(Some(Zone::new(100, 100, 10, 10)));
        let (mut m, _) = monitor(
            vec![Some(frame(0, 0)), Some(frame(255, 1))],
            alarm,
            controls,
            book.clone(),
        );

        m.tick().await;
        assert!(matches!(
            m.tick().await,
            TickOutcome::Scored { score, .. } if score == MotionScore::ZERO
        ));
        assert_eq!(book.len(), 0);
    }

    #[tokio::test]
    async fn alarm_failure_is_not_fatal() {
        let alarm = RecordingAlarm {
            fail_play: true,
            ..RecordingAlarm::default()
        };
        let book = LogBook::new();
        let (mut m, _) = monitor(
            vec![Some(frame(0, 0)), Some(frame(200, 1)), Some(frame(0, 2))],
            alarm,
            controls(),
            book.clone(),
        );

        m.tick().await;
        let outcome = m.tick().await;
        assert!(matches!(
            outcome,
            TickOutcome::Scored { step, .. } if step.state == Some(AlarmState::Alarm) && step.log
        ));
        assert_eq!(book.len(), 1);
    }

    #[tokio::test]
    async fn keep_raw_stores_frame_samples() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let (mut m, _) = monitor(
            vec![Some(frame(0, 0)), Some(frame(90, 1))],
            alarm,
            controls(),
            book.clone(),
        );
        m.settings.keep_raw = true;

        m.tick().await;
        m.tick().await;
        assert_eq!(
            book.get(0).unwrap().raw.as_deref(),
            Some(&[90u8; 48][..])
        );
    }

    #[tokio::test]
    async fn shutdown_stops_alarm_and_closes_source() {
        let alarm = RecordingAlarm::default();
        let book = LogBook::new();
        let controls = controls();
        let (m, closed) = monitor(
            vec![Some(frame(0, 0)), Some(frame(200, 1))],
            alarm.clone(),
            Arc::clone(&controls),
            book.clone(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(m.run(rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while book.len() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(*alarm.playing.lock().unwrap());
        assert!(controls.status().running);
        assert_eq!(controls.status().state, Some(AlarmState::Alarm));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!*alarm.playing.lock().unwrap());
        assert!(*closed.lock().unwrap());
        assert_eq!(alarm.calls.lock().unwrap().last(), Some(&"reset"));
        assert!(!controls.status().running);
    }
}
