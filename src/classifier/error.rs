//! Analysis error types.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dataset::DatasetError;

/// Errors from loading artifacts or classifying a sample.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Model, scaler or sample file does not exist
    #[error("file not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// File exists but cannot be read or decoded
    #[error("cannot use {}: {reason}", .path.display())]
    ArtifactUnreadable { path: PathBuf, reason: String },

    /// Sample table lacks the sensor columns and is not exactly four wide
    #[error("schema mismatch in {source_name}: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        source_name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid sample data: {0}")]
    InvalidSample(String),

    #[error("no sample rows in {0}")]
    NoSamples(String),

    /// Model output does not match its own class set
    #[error("model output invalid: {0}")]
    ModelOutput(String),
}

impl AnalysisError {
    pub fn unreadable(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::ArtifactUnreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<DatasetError> for AnalysisError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound(path) => Self::ArtifactNotFound(path),
            DatasetError::Io { path, source } => Self::unreadable(&path, source),
            DatasetError::SchemaMismatch {
                source_name,
                expected,
                found,
            } => Self::SchemaMismatch {
                source_name,
                expected,
                found,
            },
            err @ DatasetError::InvalidRow { .. } => Self::InvalidSample(err.to_string()),
            DatasetError::NoRows(source) => Self::NoSamples(source),
        }
    }
}
