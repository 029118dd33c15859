//! Acquisition Integration Tests
//!
//! Drives the controller end to end with scripted replay sources: sync to the
//! first valid line, noise handling, stop and join, output file rules.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use enose_lab::acquisition::{
    AcquisitionController, ControlError, IngestError, JoinOutcome, LinePoll, LineSource,
    ReplayEnd, ReplaySource, SessionRequest, SessionState, StatusLevel, StatusSink, StopReason,
};
use enose_lab::config::AcquisitionConfig;
use enose_lab::{SensorRecord, CSV_HEADER};

const JOIN: Duration = Duration::from_secs(5);

fn fast_config() -> AcquisitionConfig {
    AcquisitionConfig {
        settle_ms: 0,
        sync_timeout_ms: 2_000,
        poll_interval_ms: 1,
        idle_poll_interval_ms: 1,
        ..AcquisitionConfig::default()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn finished(outcome: JoinOutcome) -> Result<enose_lab::acquisition::SessionReport, IngestError> {
    match outcome {
        JoinOutcome::Finished(result) => result,
        other => panic!("expected a finished session, got {other:?}"),
    }
}

// ============================================================================
// Synchronisation
// ============================================================================

#[tokio::test]
async fn clean_stream_writes_header_once_and_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines(["1.0,2.0,3.0,4.0", "1.1,2.1,3.1,4.1", "1.2,2.2,3.2,4.2"]);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("etanol_01.csv")))
        .unwrap();
    let report = finished(controller.join(JOIN).await).unwrap();

    assert_eq!(report.stop_reason, StopReason::SourceClosed);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.lines_discarded, 0);
    assert_eq!(
        read_lines(handle.output()),
        vec![CSV_HEADER, "1.0,2.0,3.0,4.0", "1.1,2.1,3.1,4.1", "1.2,2.2,3.2,4.2"]
    );
}

#[tokio::test]
async fn boot_noise_is_discarded_before_sync() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines([
        "MQ array warming up",
        "1.0,2.0",
        "calibrating...",
        "0.5,0.6,0.7,0.8",
        "0.9,1.0,1.1,1.2",
    ]);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("metanol")))
        .unwrap();
    let report = finished(controller.join(JOIN).await).unwrap();

    assert_eq!(report.lines_discarded, 3);
    assert_eq!(report.records_written, 2);
    let lines = read_lines(handle.output());
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines[1], "0.5,0.6,0.7,0.8");
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn sync_timeout_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = AcquisitionConfig {
        sync_timeout_ms: 100,
        ..fast_config()
    };
    let controller = AcquisitionController::new(config, StatusSink::disabled());
    let source = ReplaySource::from_lines(["noise", "more noise"]).with_end(ReplayEnd::HoldOpen);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("timeout")))
        .unwrap();
    let err = finished(controller.join(JOIN).await).unwrap_err();

    assert!(matches!(err, IngestError::SyncTimeout { .. }), "{err:?}");
    assert!(!handle.output().exists());
    assert_eq!(handle.state(), SessionState::Stopped);
}

// ============================================================================
// Recording
// ============================================================================

#[tokio::test]
async fn malformed_line_mid_recording_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines([
        "1,2,3,4",
        "1,2,x,4",
        "nan,2,3,4",
        "5,6,7,8,9",
        "5,6,7,8",
    ]);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("mix")))
        .unwrap();
    let report = finished(controller.join(JOIN).await).unwrap();

    assert_eq!(report.records_written, 2);
    assert_eq!(report.lines_discarded, 3);
    assert_eq!(read_lines(handle.output()), vec![CSV_HEADER, "1,2,3,4", "5,6,7,8"]);
}

#[tokio::test]
async fn written_lines_parse_back_as_records() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines([" 0.12, 3.4 ,5.6e-1,7 ", "1e3,2,3,4"]);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("reparse")))
        .unwrap();
    finished(controller.join(JOIN).await).unwrap();

    let lines = read_lines(handle.output());
    assert_eq!(lines.len(), 3);
    for line in &lines[1..] {
        let record = SensorRecord::parse_line(line).unwrap();
        assert!(record.as_row().iter().all(|v| v.is_finite()));
    }
    let first = SensorRecord::parse_line(&lines[1]).unwrap();
    assert!((first.mq6 - 0.56).abs() < 1e-12);
}

#[tokio::test]
async fn stop_while_recording_keeps_saved_records() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines(["1,2,3,4", "2,3,4,5"]).with_end(ReplayEnd::HoldOpen);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("held")))
        .unwrap();
    assert_eq!(
        handle
            .wait_for_state(SessionState::Recording, Duration::from_secs(2))
            .await,
        Some(SessionState::Recording)
    );
    // Let the scripted lines drain into the file
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_busy());

    controller.request_stop(handle.id()).unwrap();
    // Poll interval is 1 ms; the stop must land within a few polls
    assert_eq!(
        handle
            .wait_for_state(SessionState::Stopped, Duration::from_millis(250))
            .await,
        Some(SessionState::Stopped)
    );
    let report = finished(controller.join(JOIN).await).unwrap();

    assert_eq!(report.stop_reason, StopReason::StopRequested);
    assert_eq!(report.records_written, 2);
    assert_eq!(read_lines(handle.output()), vec![CSV_HEADER, "1,2,3,4", "2,3,4,5"]);
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn stop_during_sync_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines(["booting"]).with_end(ReplayEnd::HoldOpen);

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("never")))
        .unwrap();
    handle
        .wait_for_state(SessionState::Syncing, Duration::from_secs(2))
        .await;
    handle.request_stop();

    let report = finished(controller.join(JOIN).await).unwrap();
    assert_eq!(report.stop_reason, StopReason::StopRequested);
    assert!(!report.file_created);
    assert!(!handle.output().exists());
}

#[tokio::test]
async fn device_failure_mid_recording_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let source = ReplaySource::from_lines(["1,2,3,4", "4,3,2,1"])
        .with_end(ReplayEnd::Fail("device unplugged".to_string()));

    let handle = controller
        .start(Box::new(source), SessionRequest::new(dir.path().join("unplugged")))
        .unwrap();
    let err = finished(controller.join(JOIN).await).unwrap_err();

    match err {
        IngestError::Serial { message, .. } => assert!(message.contains("unplugged")),
        other => panic!("expected serial error, got {other:?}"),
    }
    assert_eq!(read_lines(handle.output()), vec![CSV_HEADER, "1,2,3,4", "4,3,2,1"]);
}

// ============================================================================
// Controller rules
// ============================================================================

#[tokio::test]
async fn second_start_is_rejected_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let first = controller
        .start(
            Box::new(ReplaySource::from_lines(["1,2,3,4"]).with_end(ReplayEnd::HoldOpen)),
            SessionRequest::new(dir.path().join("first")),
        )
        .unwrap();
    first
        .wait_for_state(SessionState::Recording, Duration::from_secs(2))
        .await;

    let second = controller.start(
        Box::new(ReplaySource::from_lines(["9,9,9,9"])),
        SessionRequest::new(dir.path().join("second")),
    );
    match second {
        Err(ControlError::SessionActive(id)) => assert_eq!(id, first.id()),
        other => panic!("expected SessionActive, got {other:?}"),
    }
    assert!(!dir.path().join("second.csv").exists());
    assert_eq!(first.state(), SessionState::Recording);

    let report = finished(controller.shutdown(JOIN).await).unwrap();
    assert_eq!(report.session_id, first.id());
    assert_eq!(report.records_written, 1);

    // Slot is free again
    let third = controller
        .start(
            Box::new(ReplaySource::from_lines(["5,5,5,5"])),
            SessionRequest::new(dir.path().join("third")),
        )
        .unwrap();
    assert_ne!(third.id(), first.id());
    finished(controller.join(JOIN).await).unwrap();
}

#[tokio::test]
async fn existing_output_requires_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("etanol.csv");
    std::fs::write(&target, "old contents\n").unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());

    let refused = controller.start(
        Box::new(ReplaySource::from_lines(["1,2,3,4"])),
        SessionRequest::new(dir.path().join("etanol")),
    );
    assert!(matches!(refused, Err(ControlError::OutputExists(_))));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "old contents\n");
    assert!(!controller.is_busy());

    controller
        .start(
            Box::new(ReplaySource::from_lines(["1,2,3,4"])),
            SessionRequest::new(dir.path().join("etanol")).overwrite(true),
        )
        .unwrap();
    finished(controller.join(JOIN).await).unwrap();
    assert_eq!(read_lines(&target), vec![CSV_HEADER, "1,2,3,4"]);
}

/// Delivers one record, then hangs inside the read and ignores the stop
/// signal, like a driver stuck in a long blocking call.
struct StuckSource {
    sent: bool,
}

#[async_trait]
impl LineSource for StuckSource {
    async fn connect(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<LinePoll, IngestError> {
        if !self.sent {
            self.sent = true;
            return Ok(LinePoll::Line("1,2,3,4".to_string()));
        }
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(LinePoll::Pending)
    }

    async fn disconnect(&mut self) {}

    fn source_name(&self) -> &str {
        "stuck"
    }
}

#[tokio::test]
async fn join_timeout_keeps_stuck_worker_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let stuck = controller
        .start(
            Box::new(StuckSource { sent: false }),
            SessionRequest::new(dir.path().join("stuck")),
        )
        .unwrap();
    stuck
        .wait_for_state(SessionState::Recording, Duration::from_secs(2))
        .await;

    match controller.join(Duration::from_millis(20)).await {
        JoinOutcome::TimedOut(id) => assert_eq!(id, stuck.id()),
        other => panic!("expected TimedOut, got {other:?}"),
    }

    // The abandoned worker still owns the device
    assert!(controller.is_busy());
    let refused = controller.start(
        Box::new(ReplaySource::from_lines(["5,6,7,8"])),
        SessionRequest::new(dir.path().join("second")),
    );
    assert!(matches!(refused, Err(ControlError::SessionActive(id)) if id == stuck.id()));
    assert!(!dir.path().join("second.csv").exists());

    // Record written before the hang is on disk
    assert_eq!(read_lines(stuck.output()), vec![CSV_HEADER, "1,2,3,4"]);
    assert!(matches!(
        controller.join(Duration::from_millis(20)).await,
        JoinOutcome::TimedOut(_)
    ));
}

#[tokio::test]
async fn start_after_timed_out_worker_exits() {
    let dir = tempfile::tempdir().unwrap();
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    let first = controller
        .start(
            Box::new(ReplaySource::from_lines(["1,2,3,4"]).with_end(ReplayEnd::HoldOpen)),
            SessionRequest::new(dir.path().join("first")),
        )
        .unwrap();
    first
        .wait_for_state(SessionState::Recording, Duration::from_secs(2))
        .await;

    assert!(matches!(
        controller.join(Duration::from_millis(20)).await,
        JoinOutcome::TimedOut(_)
    ));
    // The timeout also signalled stop; the worker honours it at its next poll
    assert_eq!(
        first
            .wait_for_state(SessionState::Stopped, Duration::from_secs(2))
            .await,
        Some(SessionState::Stopped)
    );
    let report = finished(controller.join(JOIN).await).unwrap();
    assert_eq!(report.stop_reason, StopReason::StopRequested);

    controller
        .start(
            Box::new(ReplaySource::from_lines(["5,6,7,8"])),
            SessionRequest::new(dir.path().join("second")),
        )
        .unwrap();
    finished(controller.join(JOIN).await).unwrap();
    assert_eq!(read_lines(&dir.path().join("second.csv")), vec![CSV_HEADER, "5,6,7,8"]);
}

#[tokio::test]
async fn join_without_session() {
    let controller = AcquisitionController::new(fast_config(), StatusSink::disabled());
    assert!(matches!(
        controller.join(Duration::from_millis(10)).await,
        JoinOutcome::NoSession
    ));
    assert!(controller.status().is_none());
}

// ============================================================================
// Status channel
// ============================================================================

#[tokio::test]
async fn status_events_report_noise_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mut events) = StatusSink::channel();
    let controller = AcquisitionController::new(fast_config(), sink);

    let handle = controller
        .start(
            Box::new(ReplaySource::from_lines(["hello", "1,2,3,4"])),
            SessionRequest::new(dir.path().join("events")),
        )
        .unwrap();
    finished(controller.join(JOIN).await).unwrap();

    let events = events.drain();
    assert!(events.iter().all(|e| e.session == Some(handle.id())));
    assert!(events
        .iter()
        .any(|e| e.level == StatusLevel::Warning && e.message.contains("hello")));
    assert!(events
        .iter()
        .any(|e| e.level == StatusLevel::Info && e.message.contains("Synchronised")));
    let last = events.last().unwrap();
    assert_eq!(last.level, StatusLevel::Info);
    assert!(last.message.contains("1 records saved"));
}
