//! Per-line validation.
//!
//! The recoverable half of the error design: a bad line is a value, not an
//! error, and the caller decides to log it and move on.

use crate::types::{RecordParseError, SensorRecord};

/// A line that is not a sensor record (boot banner, debug print, torn line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: String,
    pub reason: RecordParseError,
}

impl std::fmt::Display for MalformedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.line, self.reason)
    }
}

/// Outcome of parse-validating one line from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Valid record; `text` is the line exactly as it will be stored
    Record { record: SensorRecord, text: String },
    Discard(MalformedLine),
}

impl LineOutcome {
    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }
}

/// Parse-validate a line. The original text is kept for pass-through storage.
pub fn validate_line(line: &str) -> LineOutcome {
    let text = line.trim();
    match SensorRecord::parse_line(text) {
        Ok(record) => LineOutcome::Record {
            record,
            text: text.to_string(),
        },
        Err(reason) => LineOutcome::Discard(MalformedLine {
            line: text.to_string(),
            reason,
        }),
    }
}
