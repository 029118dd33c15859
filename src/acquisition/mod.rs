//! Sensor data acquisition module
//!
//! Reads MQ sensor lines from a serial device (or a replayed capture),
//! synchronises to the first valid record, and appends records to a sample
//! CSV file while the controlling flow keeps the right to stop it.

mod controller;
mod error;
mod line;
pub mod scanner;
mod session;
mod source;
mod status;
mod store;

use serde::{Deserialize, Serialize};

pub use controller::{AcquisitionController, JoinOutcome, SessionHandle, SessionRequest};
pub use error::{ControlError, IngestError};
pub use line::{validate_line, LineOutcome, MalformedLine};
pub use session::{SessionReport, SessionSettings, SessionState, SessionWorker, StopReason};
pub use source::{LineBuffer, LinePoll, LineSource, ReplayEnd, ReplaySource, SerialLineSource};
pub use status::{StatusEvent, StatusLevel, StatusReceiver, StatusSink};
pub use store::{ensure_csv_extension, SampleWriter};

/// Identity of one acquisition session, unique per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
