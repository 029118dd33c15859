//! Session control.
//!
//! [`AcquisitionController`] is the controlling flow's entry point: it starts
//! at most one session at a time, forwards stop requests, and waits for the
//! worker to finish with a bounded timeout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{SessionReport, SessionSettings, SessionState, SessionWorker};
use super::source::{LineSource, SerialLineSource};
use super::status::StatusSink;
use super::store::ensure_csv_extension;
use super::{ControlError, IngestError, SessionId};
use crate::config::AcquisitionConfig;

/// Where a new session writes, and whether it may replace an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub output: PathBuf,
    pub overwrite: bool,
}

impl SessionRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            overwrite: false,
        }
    }

    #[must_use]
    pub const fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Caller-side view of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    output: PathBuf,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Final output path (with `.csv` appended if it was missing).
    pub fn output(&self) -> &std::path::Path {
        &self.output
    }

    /// Set the stop signal. Idempotent; the worker notices within one poll.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Resolve once the worker has published `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state.clone();
        // Err means the sender is gone, which also means the worker is done
        let _ = rx.wait_for(|s| *s == SessionState::Stopped).await;
    }

    /// Wait until the session reaches `target` (or has stopped).
    ///
    /// Returns the state actually observed, or `None` on timeout.
    pub async fn wait_for_state(
        &self,
        target: SessionState,
        timeout: Duration,
    ) -> Option<SessionState> {
        let mut rx = self.state.clone();
        let wait = rx.wait_for(|s| *s == target || *s == SessionState::Stopped);
        // Bound first so the borrowed `Ref` is released before `rx`
        let observed = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => Some(*state),
            // Sender gone: the worker has finished
            Ok(Err(_)) => Some(SessionState::Stopped),
            Err(_) => None,
        };
        observed
    }
}

/// Result of waiting for the active session.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Worker finished; its own result
    Finished(Result<SessionReport, IngestError>),
    /// Worker did not stop in time and was abandoned
    TimedOut(SessionId),
    /// Worker task panicked or was aborted
    Aborted(SessionId, String),
    NoSession,
}

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<Result<SessionReport, IngestError>>,
}

/// Starts, stops and joins acquisition sessions, one at a time.
pub struct AcquisitionController {
    config: AcquisitionConfig,
    status: StatusSink,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
}

impl AcquisitionController {
    pub fn new(config: AcquisitionConfig, status: StatusSink) -> Self {
        Self {
            config,
            status,
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a serial device and start recording from it.
    pub fn open_session(
        &self,
        port: &str,
        baud_rate: u32,
        request: SessionRequest,
    ) -> Result<SessionHandle, ControlError> {
        let source =
            SerialLineSource::new(port, baud_rate).with_read_timeout(self.config.read_timeout());
        self.start(Box::new(source), request)
    }

    /// Start a session reading from any line source.
    ///
    /// Rejected without side effects when a session is still alive or when
    /// the output exists and `overwrite` was not confirmed. Must be called
    /// from within a tokio runtime.
    pub fn start(
        &self,
        mut source: Box<dyn LineSource>,
        request: SessionRequest,
    ) -> Result<SessionHandle, ControlError> {
        let mut active = self.lock();

        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                return Err(ControlError::SessionActive(current.handle.id));
            }
        }

        let output = ensure_csv_extension(request.output);
        if output.exists() && !request.overwrite {
            return Err(ControlError::OutputExists(output));
        }

        if let Some(previous) = active.take() {
            info!(session = %previous.handle.id, "Discarding finished session result");
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let worker = SessionWorker::new(
            id,
            output.clone(),
            SessionSettings::from(&self.config),
            cancel.clone(),
            self.status.clone(),
            state_tx,
        );
        let task = tokio::spawn(async move { worker.run(source.as_mut()).await });

        let handle = SessionHandle {
            id,
            output,
            cancel,
            state: state_rx,
        };
        info!(session = %id, output = %handle.output.display(), "Session started");
        *active = Some(ActiveSession {
            handle: handle.clone(),
            task,
        });
        Ok(handle)
    }

    /// Ask session `id` to stop.
    pub fn request_stop(&self, id: SessionId) -> Result<(), ControlError> {
        let active = self.lock();
        match active.as_ref() {
            Some(current) if current.handle.id == id => {
                current.handle.request_stop();
                Ok(())
            }
            Some(_) => Err(ControlError::UnknownSession(id)),
            None => Err(ControlError::NoActiveSession),
        }
    }

    /// Id and state of the tracked session, if any.
    pub fn status(&self) -> Option<(SessionId, SessionState)> {
        self.lock()
            .as_ref()
            .map(|current| (current.handle.id, current.handle.state()))
    }

    /// `true` while a worker is alive.
    pub fn is_busy(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|current| !current.task.is_finished())
    }

    /// Wait up to `timeout` for the tracked session to end.
    ///
    /// On timeout the worker is told to stop and abandoned, but it stays
    /// tracked: `start` keeps refusing new sessions until the task has
    /// actually exited, and a later `join` collects its result. Every record
    /// is flushed as written, so nothing already saved is lost.
    pub async fn join(&self, timeout: Duration) -> JoinOutcome {
        let Some(handle) = self.lock().as_ref().map(|c| c.handle.clone()) else {
            return JoinOutcome::NoSession;
        };

        if handle
            .wait_for_state(SessionState::Stopped, timeout)
            .await
            .is_none()
        {
            handle.request_stop();
            warn!(session = %handle.id, ?timeout, "Worker did not stop in time, abandoning it");
            self.status
                .for_session(handle.id)
                .warn("Worker did not stop in time; recorded data is kept");
            return JoinOutcome::TimedOut(handle.id);
        }

        let Some(current) = self.take_if(handle.id) else {
            return JoinOutcome::NoSession;
        };

        match current.task.await {
            Ok(result) => JoinOutcome::Finished(result),
            Err(e) => JoinOutcome::Aborted(handle.id, e.to_string()),
        }
    }

    /// Stop the tracked session (if any) and join it.
    pub async fn shutdown(&self, timeout: Duration) -> JoinOutcome {
        if let Some((id, _)) = self.status() {
            let _ = self.request_stop(id);
        }
        self.join(timeout).await
    }

    fn take_if(&self, id: SessionId) -> Option<ActiveSession> {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|c| c.handle.id == id) {
            active.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{ReplayEnd, ReplaySource};

    fn fast_config() -> AcquisitionConfig {
        AcquisitionConfig {
            settle_ms: 0,
            sync_timeout_ms: 2_000,
            poll_interval_ms: 1,
            idle_poll_interval_ms: 1,
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn test_session_request_builder() {
        let req = SessionRequest::new("x.csv").overwrite(true);
        assert!(req.overwrite);
        assert!(!SessionRequest::new("x.csv").overwrite);
    }

    #[tokio::test]
    async fn test_stop_unknown_and_missing_session() {
        let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
        assert!(matches!(
            controller.request_stop(SessionId(9)),
            Err(ControlError::NoActiveSession)
        ));

        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::from_lines(["1,2,3,4"]).with_end(ReplayEnd::HoldOpen);
        let handle = controller
            .start(Box::new(source), SessionRequest::new(dir.path().join("a")))
            .unwrap();
        assert!(matches!(
            controller.request_stop(SessionId(handle.id().0 + 100)),
            Err(ControlError::UnknownSession(_))
        ));

        controller.request_stop(handle.id()).unwrap();
        let outcome = controller.join(Duration::from_secs(5)).await;
        assert!(matches!(outcome, JoinOutcome::Finished(Ok(_))));
        assert!(matches!(controller.join(Duration::from_millis(10)).await, JoinOutcome::NoSession));
    }

    #[tokio::test]
    async fn test_join_timeout_stops_worker_and_keeps_slot() {
        let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::from_lines(["1,2,3,4"]).with_end(ReplayEnd::HoldOpen);
        let handle = controller
            .start(Box::new(source), SessionRequest::new(dir.path().join("slow")))
            .unwrap();
        handle
            .wait_for_state(SessionState::Recording, Duration::from_secs(2))
            .await;

        let outcome = controller.join(Duration::from_millis(20)).await;
        assert!(matches!(outcome, JoinOutcome::TimedOut(id) if id == handle.id()));

        // Still tracked until the worker has exited
        let again = controller.start(
            Box::new(ReplaySource::from_lines(["5,6,7,8"])),
            SessionRequest::new(dir.path().join("next")),
        );
        assert!(matches!(again, Err(ControlError::SessionActive(id)) if id == handle.id()));

        match controller.join(Duration::from_secs(5)).await {
            JoinOutcome::Finished(Ok(report)) => {
                assert_eq!(report.stop_reason, crate::acquisition::StopReason::StopRequested);
            }
            other => panic!("expected finished session, got {other:?}"),
        }
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_output_gets_csv_suffix() {
        let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
        let dir = tempfile::tempdir().unwrap();
        let handle = controller
            .start(
                Box::new(ReplaySource::from_lines(["1,2,3,4"])),
                SessionRequest::new(dir.path().join("metanol_02")),
            )
            .unwrap();
        assert_eq!(handle.output(), dir.path().join("metanol_02.csv"));
        let _ = controller.join(Duration::from_secs(5)).await;
        assert!(dir.path().join("metanol_02.csv").exists());
    }
}
