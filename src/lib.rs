//! enose-lab: Electronic Nose Laboratory Tool
//!
//! Acquisition, training and classification for a four-channel MQ gas-sensor
//! array (MQ3, MQ5, MQ6, MQ8).
//!
//! ## Architecture
//!
//! - **Acquisition**: serial line ingestion with synchronisation to the first
//!   valid record, append-only sample files, cooperative stop
//! - **Classifier**: min-max scaling, averaged class probabilities and the
//!   confidence / margin decision policy
//! - **Training**: seeded split, Gaussian naive Bayes fit, evaluation and
//!   artifact persistence
//! - **Config**: TOML configuration with validation and typo suggestions

pub mod acquisition;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod training;
pub mod types;

// Re-export lab configuration
pub use config::LabConfig;

// Re-export commonly used types
pub use types::{
    ConfidenceVerdict, FeatureRow, SensorRecord, VerdictKind, CSV_HEADER, LOW_CONFIDENCE_LABEL,
    POSSIBLE_MIXTURE_LABEL, SENSOR_COLUMNS,
};

// Re-export acquisition control
pub use acquisition::{
    AcquisitionController, IngestError, JoinOutcome, SessionHandle, SessionRequest, SessionState,
    StatusEvent, StatusLevel, StatusSink,
};

// Re-export the decision engine
pub use classifier::{analyze_file, classify, AnalysisError, DecisionPolicy, TrainedModel};
