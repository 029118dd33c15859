//! Core data types for the electronic nose.

mod record;
mod verdict;

pub use record::{
    FeatureRow, RecordParseError, SensorRecord, CSV_HEADER, NUM_SENSORS, SENSOR_COLUMNS,
};
pub use verdict::{
    ConfidenceVerdict, VerdictKind, LOW_CONFIDENCE_LABEL, POSSIBLE_MIXTURE_LABEL,
};
