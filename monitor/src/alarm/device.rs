use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("failed to spawn alarm player {0}: {1}")]
    Spawn(String, std::io::Error),
    #[error("failed to stop alarm player: {0}")]
    Kill(std::io::Error),
}

/// Audible alarm output. The monitor only issues directives and asks
/// whether the device is currently sounding.
pub trait AlarmDevice: Send {
    fn play(&mut self) -> Result<(), AlarmError>;

    fn pause(&mut self) -> Result<(), AlarmError>;

    /// Rewind so the next `play` starts from the beginning.
    fn reset_position(&mut self) -> Result<(), AlarmError>;

    fn is_playing(&mut self) -> bool;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Plays the alarm by spawning an external player, e.g. `aplay alarm.wav`.
///
/// Every `play` starts a fresh process, so playback always begins at the
/// start of the clip and `reset_position` has nothing left to do.
pub struct CommandAlarm {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandAlarm {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            child: None,
        }
    }
}

impl AlarmDevice for CommandAlarm {
    fn play(&mut self) -> Result<(), AlarmError> {
        if self.is_playing() {
            return Ok(());
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AlarmError::Spawn(self.program.clone(), e))?;
        info!(program = self.program, pid = child.id(), "alarm player started");
        self.child = Some(child);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AlarmError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => {
                child.start_kill().map_err(AlarmError::Kill)?;
                info!(program = self.program, "alarm player stopped");
                Ok(())
            }
        }
    }

    fn reset_position(&mut self) -> Result<(), AlarmError> {
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "alarm player exited");
                self.child = None;
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to poll alarm player");
                self.child = None;
                false
            }
        }
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Alarm without audio output, used when no player is configured.
/// Only records whether it would be sounding.
#[derive(Default)]
pub struct SilentAlarm {
    playing: bool,
}

impl SilentAlarm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmDevice for SilentAlarm {
    fn play(&mut self) -> Result<(), AlarmError> {
        if !self.playing {
            warn!("ALARM: motion detected (no player configured)");
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AlarmError> {
        self.playing = false;
        Ok(())
    }

    fn reset_position(&mut self) -> Result<(), AlarmError> {
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.playing
    }

    fn name(&self) -> &str {
        "silent"
    }
}
