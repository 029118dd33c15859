//! Sensor record: one MQ3/MQ5/MQ6/MQ8 reading as it travels from the wire
//! to the CSV store and into the classifier.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of gas-sensor channels on the nose.
pub const NUM_SENSORS: usize = 4;

/// Sensor column names, in wire and file order.
pub const SENSOR_COLUMNS: [&str; NUM_SENSORS] = ["MQ3", "MQ5", "MQ6", "MQ8"];

/// Header row of every sample file.
pub const CSV_HEADER: &str = "MQ3,MQ5,MQ6,MQ8";

/// One feature vector in sensor column order.
pub type FeatureRow = [f64; NUM_SENSORS];

/// Why a line is not a sensor record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    #[error("field {index} ('{value}') is not a number")]
    NotNumeric { index: usize, value: String },

    #[error("field {index} ('{value}') is not finite")]
    NotFinite { index: usize, value: String },
}

/// A validated 4-channel sensor response ratio reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub mq3: f64,
    pub mq5: f64,
    pub mq6: f64,
    pub mq8: f64,
}

impl SensorRecord {
    pub const fn from_row(row: FeatureRow) -> Self {
        Self {
            mq3: row[0],
            mq5: row[1],
            mq6: row[2],
            mq8: row[3],
        }
    }

    pub const fn as_row(&self) -> FeatureRow {
        [self.mq3, self.mq5, self.mq6, self.mq8]
    }

    /// Parse a comma-separated line of exactly four numbers.
    ///
    /// Surrounding whitespace on the line and on each field is ignored. NaN
    /// and infinities are rejected: they parse as floats but are not sensor
    /// readings.
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != NUM_SENSORS {
            return Err(RecordParseError::FieldCount(fields.len()));
        }

        let mut row = [0.0_f64; NUM_SENSORS];
        for (index, (slot, raw)) in row.iter_mut().zip(&fields).enumerate() {
            let raw = raw.trim();
            let value: f64 = raw.parse().map_err(|_| RecordParseError::NotNumeric {
                index,
                value: raw.to_string(),
            })?;
            if !value.is_finite() {
                return Err(RecordParseError::NotFinite {
                    index,
                    value: raw.to_string(),
                });
            }
            *slot = value;
        }

        Ok(Self::from_row(row))
    }
}

impl From<FeatureRow> for SensorRecord {
    fn from(row: FeatureRow) -> Self {
        Self::from_row(row)
    }
}
