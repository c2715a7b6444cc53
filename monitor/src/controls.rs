use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use motion_watch_common::config::ControlsConfig;
use motion_watch_common::frame::Zone;
use tracing::info;

use crate::alarm::{AlarmFlags, AlarmState};
use crate::detector::MotionScore;

/// Live detection state published by the monitor loop once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonitorStatus {
    pub running: bool,
    /// `None` until the first score has been computed.
    pub state: Option<AlarmState>,
    /// Score of the latest processed frame; `None` after a baseline reset.
    pub last_score: Option<MotionScore>,
    pub frames: u64,
}

/// State shared between the monitor loop and the control surface.
///
/// The control surface writes flags and zone, which the loop reads once per
/// cycle. The loop writes `MonitorStatus`, which the control surface reads.
pub struct Controls {
    alarm_enabled: AtomicBool,
    logging_enabled: AtomicBool,
    zone: RwLock<Option<Zone>>,
    status: RwLock<MonitorStatus>,
}

impl Controls {
    pub fn new(config: &ControlsConfig, zone: Option<Zone>) -> Self {
        Self {
            alarm_enabled: AtomicBool::new(config.alarm_enabled),
            logging_enabled: AtomicBool::new(config.logging_enabled),
            zone: RwLock::new(zone),
            status: RwLock::new(MonitorStatus::default()),
        }
    }

    pub fn flags(&self) -> AlarmFlags {
        AlarmFlags {
            alarm_enabled: self.alarm_enabled.load(Ordering::Acquire),
            logging_enabled: self.logging_enabled.load(Ordering::Acquire),
        }
    }

    pub fn set_alarm_enabled(&self, enabled: bool) {
        self.alarm_enabled.store(enabled, Ordering::Release);
        info!(enabled, "alarm toggled");
    }

    pub fn set_logging_enabled(&self, enabled: bool) {
        self.logging_enabled.store(enabled, Ordering::Release);
        info!(enabled, "logging toggled");
    }

    pub fn zone(&self) -> Option<Zone> {
        *self.zone.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the detection zone; `None` watches the whole frame.
    pub fn set_zone(&self, zone: Option<Zone>) {
        *self.zone.write().unwrap_or_else(PoisonError::into_inner) = zone;
        match zone {
            Some(z) => info!(x = z.x, y = z.y, width = z.width, height = z.height, "zone set"),
            None => info!("zone cleared, watching full frame"),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_status(&self, update: impl FnOnce(&mut MonitorStatus)) {
        update(&mut self.status.write().unwrap_or_else(PoisonError::into_inner));
    }
}
