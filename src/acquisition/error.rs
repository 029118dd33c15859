//! Acquisition error types.
//!
//! Per-line problems never show up here: they are a
//! [`LineOutcome::Discard`](super::LineOutcome) and the session carries on.
//! Everything in [`IngestError`] ends the session.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::SessionId;

/// Fatal session errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No valid data line within the synchronisation window; no file was created
    #[error("no valid sensor line within {:.1}s of synchronisation", .waited.as_secs_f64())]
    SyncTimeout { waited: Duration },

    /// Device could not be opened, read, or disappeared
    #[error("serial error on {port}: {message}")]
    Serial { port: String, message: String },

    /// Output file could not be created or written
    #[error("file I/O error on {}: {source}", .path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn serial(port: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Serial {
            port: port.into(),
            message: message.to_string(),
        }
    }

    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned to the controlling flow by session commands.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Only one session may run at a time
    #[error("acquisition session {0} is already running")]
    SessionActive(SessionId),

    /// Output exists and the caller did not confirm overwriting it
    #[error("output file {} already exists; confirm overwrite to replace it", .0.display())]
    OutputExists(PathBuf),

    #[error("no acquisition session is running")]
    NoActiveSession,

    #[error("session {0} is not the active session")]
    UnknownSession(SessionId),
}
