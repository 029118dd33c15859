//! Status event channel.
//!
//! The acquisition worker and the analysis routine report human-readable
//! progress through a [`StatusSink`]. Any presentation layer (CLI, GUI, log
//! file) drains the matching [`StatusReceiver`]; the core never holds a
//! reference to a widget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::SessionId;

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One entry of the operator-visible status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Session that produced the event, `None` for analysis events
    pub session: Option<SessionId>,
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:<5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Sending half of the status channel.
///
/// Cloning is cheap. A sink whose receiver was dropped silently discards
/// events, so a vanished presentation layer never stalls acquisition.
#[derive(Debug, Clone, Default)]
pub struct StatusSink {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
    session: Option<SessionId>,
}

impl StatusSink {
    /// Create a connected sink / receiver pair.
    pub fn channel() -> (Self, StatusReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                session: None,
            },
            StatusReceiver { rx },
        )
    }

    /// A sink that drops every event.
    pub const fn disabled() -> Self {
        Self {
            tx: None,
            session: None,
        }
    }

    /// Same channel, with events tagged by `session`.
    #[must_use]
    pub fn for_session(&self, session: SessionId) -> Self {
        Self {
            tx: self.tx.clone(),
            session: Some(session),
        }
    }

    pub fn emit(&self, level: StatusLevel, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(StatusEvent {
                level,
                message: message.into(),
                timestamp: Utc::now(),
                session: self.session,
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Error, message);
    }
}

/// Receiving half of the status channel, events arrive in emission order.
#[derive(Debug)]
pub struct StatusReceiver {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusReceiver {
    /// Wait for the next event; `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Collect everything already queued without waiting.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
