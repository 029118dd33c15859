//! Acquisition session worker.
//!
//! Drives one session through `Connecting → Syncing → Recording → Stopped`.
//! The worker owns the line source and the sample file; the controlling flow
//! only sees the state channel, the status sink and the final report.

use std::path::PathBuf;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::line::{validate_line, LineOutcome};
use super::source::{LinePoll, LineSource};
use super::status::StatusSink;
use super::store::SampleWriter;
use super::{IngestError, SessionId};
use crate::config::AcquisitionConfig;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Syncing,
    Recording,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Syncing => write!(f, "syncing"),
            Self::Recording => write!(f, "recording"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Timing knobs for the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Wait after opening the device (boards reset when the port opens)
    pub settle: Duration,
    /// Synchronisation window
    pub sync_timeout: Duration,
    /// Sleep while recording and no line is waiting
    pub poll_interval: Duration,
    /// Sleep while syncing and no line is waiting
    pub idle_poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AcquisitionConfig::default())
    }
}

impl From<&AcquisitionConfig> for SessionSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            settle: config.settle(),
            sync_timeout: config.sync_timeout(),
            poll_interval: config.poll_interval(),
            idle_poll_interval: config.idle_poll_interval(),
        }
    }
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    StopRequested,
    /// The source reported end of stream while recording
    SourceClosed,
}

/// Summary of a session that ended without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub output_path: PathBuf,
    /// False when stopped before synchronisation; no file exists then
    pub file_created: bool,
    pub records_written: u64,
    pub lines_discarded: u64,
    pub stop_reason: StopReason,
}

/// Runs one acquisition session to completion.
///
/// Built with [`new()`](SessionWorker::new) and consumed by
/// [`run()`](SessionWorker::run). Whatever the outcome, the source is
/// disconnected, the file flushed and `Stopped` published before `run`
/// returns.
pub struct SessionWorker {
    id: SessionId,
    output: PathBuf,
    settings: SessionSettings,
    cancel: CancellationToken,
    status: StatusSink,
    state_tx: watch::Sender<SessionState>,
    writer: Option<SampleWriter>,
    file_created: bool,
    lines_discarded: u64,
}

impl SessionWorker {
    pub fn new(
        id: SessionId,
        output: PathBuf,
        settings: SessionSettings,
        cancel: CancellationToken,
        status: StatusSink,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            id,
            output,
            settings,
            cancel,
            status: status.for_session(id),
            state_tx,
            writer: None,
            file_created: false,
            lines_discarded: 0,
        }
    }

    pub async fn run(mut self, source: &mut dyn LineSource) -> Result<SessionReport, IngestError> {
        info!(
            session = %self.id,
            source = source.source_name(),
            output = %self.output.display(),
            "Acquisition session starting"
        );

        let outcome = self.drive(source).await;

        source.disconnect().await;
        let closed = match self.writer.take() {
            Some(writer) => writer.close().await.map(Some),
            None => Ok(None),
        };
        self.state_tx.send_replace(SessionState::Stopped);

        let result = outcome.and_then(|reason| {
            let records_written = closed?.unwrap_or(0);
            Ok(SessionReport {
                session_id: self.id,
                output_path: self.output.clone(),
                file_created: self.file_created,
                records_written,
                lines_discarded: self.lines_discarded,
                stop_reason: reason,
            })
        });

        match &result {
            Ok(report) => {
                info!(
                    session = %self.id,
                    records = report.records_written,
                    discarded = report.lines_discarded,
                    reason = ?report.stop_reason,
                    "Acquisition session stopped"
                );
                self.status.info(format!(
                    "Session stopped: {} records saved to {}",
                    report.records_written,
                    self.output.display()
                ));
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Acquisition session failed");
                self.status.error(format!("Session failed: {e}"));
            }
        }
        result
    }

    async fn drive(&mut self, source: &mut dyn LineSource) -> Result<StopReason, IngestError> {
        self.publish(SessionState::Connecting);
        self.status.info(format!("Connecting to {}", source.source_name()));
        source.connect().await?;

        if !self.pause(self.settings.settle).await {
            return Ok(StopReason::StopRequested);
        }

        self.publish(SessionState::Syncing);
        self.status.info("Waiting for first valid sensor line");
        if !self.synchronize(source).await? {
            return Ok(StopReason::StopRequested);
        }

        self.publish(SessionState::Recording);
        self.status.info(format!("Recording to {}", self.output.display()));
        self.record(source).await
    }

    /// Returns `false` when stopped before a valid line arrived.
    async fn synchronize(&mut self, source: &mut dyn LineSource) -> Result<bool, IngestError> {
        let deadline = Instant::now() + self.settings.sync_timeout;

        loop {
            if self.cancel.is_cancelled() {
                info!(session = %self.id, "Stop requested during synchronisation");
                return Ok(false);
            }
            if Instant::now() >= deadline {
                return Err(IngestError::SyncTimeout {
                    waited: self.settings.sync_timeout,
                });
            }

            match source.poll_line().await? {
                LinePoll::Line(line) => match validate_line(&line) {
                    LineOutcome::Record { text, .. } => {
                        let writer = self
                            .writer
                            .insert(SampleWriter::create(&self.output).await?);
                        self.file_created = true;
                        writer.append(&text).await?;
                        info!(session = %self.id, first = %text, "Synchronised");
                        self.status.info("Synchronised with sensor stream");
                        return Ok(true);
                    }
                    LineOutcome::Discard(malformed) => {
                        self.discard(&malformed.to_string());
                        self.pause(self.settings.poll_interval).await;
                    }
                },
                LinePoll::Pending => {
                    self.pause(self.settings.idle_poll_interval).await;
                }
                LinePoll::Closed => {
                    return Err(IngestError::serial(
                        source.source_name(),
                        "device closed before synchronisation",
                    ));
                }
            }
        }
    }

    async fn record(&mut self, source: &mut dyn LineSource) -> Result<StopReason, IngestError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(StopReason::StopRequested);
            }

            match source.poll_line().await? {
                LinePoll::Line(line) => {
                    match validate_line(&line) {
                        LineOutcome::Record { text, .. } => {
                            let Some(writer) = self.writer.as_mut() else {
                                return Err(IngestError::file_io(
                                    &self.output,
                                    std::io::Error::other("sample file is not open"),
                                ));
                            };
                            writer.append(&text).await?;
                            debug!(session = %self.id, line = %text, "Record appended");
                        }
                        LineOutcome::Discard(malformed) => self.discard(&malformed.to_string()),
                    }
                    tokio::task::yield_now().await;
                }
                LinePoll::Pending => {
                    self.pause(self.settings.poll_interval).await;
                }
                LinePoll::Closed => {
                    info!(session = %self.id, "Source closed");
                    self.status.warn("Sensor stream ended");
                    return Ok(StopReason::SourceClosed);
                }
            }
        }
    }

    fn discard(&mut self, what: &str) {
        self.lines_discarded += 1;
        debug!(session = %self.id, line = what, "Discarded line");
        self.status.warn(format!("Ignored line {what}"));
    }

    /// Sleep unless stopped first; returns `false` if the stop signal won.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    fn publish(&self, state: SessionState) {
        debug!(session = %self.id, %state, "Session state");
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ReplaySource;

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            settle: Duration::ZERO,
            sync_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
            idle_poll_interval: Duration::from_millis(1),
        }
    }

    fn worker(output: PathBuf, cancel: CancellationToken) -> (SessionWorker, watch::Receiver<SessionState>) {
        let (tx, rx) = watch::channel(SessionState::Connecting);
        let worker = SessionWorker::new(
            SessionId(1),
            output,
            fast_settings(),
            cancel,
            StatusSink::disabled(),
            tx,
        );
        (worker, rx)
    }

    #[tokio::test]
    async fn test_noise_then_records_until_source_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        let (worker, state) = worker(path.clone(), CancellationToken::new());

        let mut source = ReplaySource::from_lines([
            "Inicializando sensores...",
            "1.0,2.0,3.0,4.0",
            "garbage",
            "5,6,7,8",
        ]);
        let report = worker.run(&mut source).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::SourceClosed);
        assert_eq!(report.records_written, 2);
        assert_eq!(report.lines_discarded, 2);
        assert!(report.file_created);
        assert_eq!(*state.borrow(), SessionState::Stopped);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "MQ3,MQ5,MQ6,MQ8\n1.0,2.0,3.0,4.0\n5,6,7,8\n"
        );
    }

    #[tokio::test]
    async fn test_closed_before_sync_is_serial_error_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        let (worker, _state) = worker(path.clone(), CancellationToken::new());

        let mut source = ReplaySource::from_lines(["booting"]);
        let err = worker.run(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::Serial { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancel_before_start_stops_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (worker, _state) = worker(path.clone(), cancel);

        let mut source = ReplaySource::from_lines(["1,2,3,4"]);
        let report = worker.run(&mut source).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::StopRequested);
        assert!(!report.file_created);
        assert_eq!(report.records_written, 0);
        assert!(!path.exists());
    }
}
