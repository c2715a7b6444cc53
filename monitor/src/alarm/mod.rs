pub mod device;
pub mod state;

pub use device::{AlarmDevice, CommandAlarm, SilentAlarm};
pub use state::{AlarmFlags, AlarmState, AlarmStateMachine, Step};
