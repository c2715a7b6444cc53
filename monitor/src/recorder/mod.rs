pub mod keys;
pub mod log;
pub mod sinks;
pub mod snapshot;

pub use log::{LogBook, LogRecorder};
pub use sinks::{EmailAlertSink, HttpUploadSink};
pub use snapshot::{encode_png, EncodedImage};
