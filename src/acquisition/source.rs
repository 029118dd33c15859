//! Line source abstraction for sensor data ingestion.
//!
//! Provides a unified trait for reading text lines from different sources:
//! a serial device (the nose itself) and a replayed capture (dry runs,
//! tests). The session worker polls [`LineSource::poll_line`] between short
//! sleeps, so implementations must never block for long.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use super::IngestError;
use crate::config::defaults::MAX_LINE_BYTES;

/// Result of one non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePoll {
    /// A complete, trimmed, non-empty line
    Line(String),
    /// Nothing complete in the input buffer yet
    Pending,
    /// Source reached its end (replay exhausted, device gone for good)
    Closed,
}

/// Trait abstracting where sensor lines come from.
#[async_trait]
pub trait LineSource: Send + 'static {
    /// Open the underlying device.
    async fn connect(&mut self) -> Result<(), IngestError>;

    /// Return the next complete line if one is available, without waiting.
    async fn poll_line(&mut self) -> Result<LinePoll, IngestError>;

    /// Release the device. Safe to call more than once.
    async fn disconnect(&mut self);

    /// Human-readable name for logging (e.g. "/dev/ttyACM0", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Line framing
// ============================================================================

/// Accumulates raw bytes and yields newline-terminated lines.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// garbled line fails record validation instead of aborting the read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: usize,
    /// Inside an oversized line: drop everything up to its newline
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next non-empty line, trimmed of whitespace and `\r`.
    ///
    /// A line that outgrows [`MAX_LINE_BYTES`] is dropped whole, including
    /// the tail that arrives after the overflow.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.pending.iter().position(|&b| b == b'\n') else {
                if self.discarding {
                    self.pending.clear();
                } else if self.pending.len() > MAX_LINE_BYTES {
                    self.overflowed += 1;
                    tracing::warn!(
                        bytes = self.pending.len(),
                        "Dropping unterminated input longer than {} bytes",
                        MAX_LINE_BYTES
                    );
                    self.pending.clear();
                    self.discarding = true;
                }
                return None;
            };

            if self.discarding {
                self.pending.drain(..=pos);
                self.discarding = false;
                continue;
            }

            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Number of oversized fragments dropped so far.
    pub const fn overflowed(&self) -> usize {
        self.overflowed
    }
}

// ============================================================================
// Serial Source
// ============================================================================

/// Reads sensor lines from a serial device.
///
/// Polls the driver's input queue the way the firmware is read on the
/// bench: check how many bytes are waiting, read exactly those, split on
/// newlines. Opening and reading are blocking driver calls, so both run on
/// the blocking thread pool with the port moved in and back out.
pub struct SerialLineSource {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
    buffer: LineBuffer,
}

/// What one blocking read produced.
enum SerialChunk {
    Nothing,
    Bytes(Vec<u8>),
    Eof,
}

fn read_waiting(port: &mut dyn serialport::SerialPort) -> std::io::Result<SerialChunk> {
    let waiting = port.bytes_to_read()?;
    if waiting == 0 {
        return Ok(SerialChunk::Nothing);
    }

    let mut chunk = vec![0_u8; (waiting as usize).min(4 * MAX_LINE_BYTES)];
    match port.read(&mut chunk) {
        Ok(0) => Ok(SerialChunk::Eof),
        Ok(n) => {
            chunk.truncate(n);
            Ok(SerialChunk::Bytes(chunk))
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(SerialChunk::Nothing),
        Err(e) => Err(e),
    }
}

impl SerialLineSource {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: Duration::from_millis(crate::config::defaults::SERIAL_READ_TIMEOUT_MS),
            port: None,
            buffer: LineBuffer::new(),
        }
    }

    /// Set the per-read driver timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub const fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl LineSource for SerialLineSource {
    async fn connect(&mut self) -> Result<(), IngestError> {
        if self.port.is_some() {
            return Ok(());
        }

        tracing::info!(port = %self.port_name, baud = self.baud_rate, "Opening serial port");
        let builder = serialport::new(&self.port_name, self.baud_rate).timeout(self.read_timeout);
        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| IngestError::serial(&self.port_name, e))?
            .map_err(|e| IngestError::serial(&self.port_name, e))?;

        self.port = Some(port);
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<LinePoll, IngestError> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(LinePoll::Line(line));
        }

        let mut port = self
            .port
            .take()
            .ok_or_else(|| IngestError::serial(&self.port_name, "port is not open"))?;

        let (port, read) = tokio::task::spawn_blocking(move || {
            let read = read_waiting(port.as_mut());
            (port, read)
        })
        .await
        .map_err(|e| IngestError::serial(&self.port_name, e))?;
        self.port = Some(port);

        match read.map_err(|e| IngestError::serial(&self.port_name, e))? {
            SerialChunk::Nothing => {}
            SerialChunk::Bytes(bytes) => self.buffer.push(&bytes),
            SerialChunk::Eof => return Ok(LinePoll::Closed),
        }

        Ok(self
            .buffer
            .next_line()
            .map_or(LinePoll::Pending, LinePoll::Line))
    }

    async fn disconnect(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
    }

    fn source_name(&self) -> &str {
        &self.port_name
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// What a [`ReplaySource`] does once its script is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEnd {
    /// Report [`LinePoll::Closed`]
    Close,
    /// Stay connected and silent, like an idle device
    HoldOpen,
    /// Fail with a serial error, like an unplugged cable
    Fail(String),
}

/// Replays pre-recorded lines as if a device were sending them.
///
/// Lines are released no faster than `interval` apart. Used for dry runs of
/// the acquisition loop without hardware and throughout the test suite.
pub struct ReplaySource {
    name: String,
    lines: VecDeque<String>,
    interval: Duration,
    next_due: Option<Instant>,
    end: ReplayEnd,
    connected: bool,
}

impl ReplaySource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "replay".to_string(),
            lines: lines.into_iter().map(Into::into).collect(),
            interval: Duration::ZERO,
            next_due: None,
            end: ReplayEnd::Close,
            connected: false,
        }
    }

    /// Load a raw text capture, one device line per file line.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut source = Self::from_lines(text.lines().map(str::to_string));
        source.name = path.display().to_string();
        Ok(source)
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: ReplayEnd) -> Self {
        self.end = end;
        self
    }

    /// Lines not yet delivered.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl LineSource for ReplaySource {
    async fn connect(&mut self) -> Result<(), IngestError> {
        self.connected = true;
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<LinePoll, IngestError> {
        if !self.connected {
            return Err(IngestError::serial(&self.name, "replay is not connected"));
        }

        if let Some(due) = self.next_due {
            if Instant::now() < due {
                return Ok(LinePoll::Pending);
            }
        }

        while let Some(line) = self.lines.pop_front() {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if !self.interval.is_zero() {
                self.next_due = Some(Instant::now() + self.interval);
            }
            return Ok(LinePoll::Line(line));
        }

        match &self.end {
            ReplayEnd::Close => Ok(LinePoll::Closed),
            ReplayEnd::HoldOpen => Ok(LinePoll::Pending),
            ReplayEnd::Fail(message) => Err(IngestError::serial(&self.name, message)),
        }
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
