//! Model and scaler artifacts.
//!
//! Two independently loadable JSON documents, each carrying a format version
//! and the feature order it was fitted on. Saves are atomic (temp file, then
//! rename) so an interrupted training run never leaves a torn artifact.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use super::error::AnalysisError;
use super::model::{GaussianNb, TrainedModel};
use super::scaler::MinMaxScaler;
use crate::types::{FeatureRow, SENSOR_COLUMNS};

/// Current artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Fitted model of any supported family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    GaussianNb(GaussianNb),
}

impl ModelKind {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::GaussianNb(m) => m.validate(),
        }
    }
}

impl TrainedModel for ModelKind {
    fn classes(&self) -> &[String] {
        match self {
            Self::GaussianNb(m) => m.classes(),
        }
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        match self {
            Self::GaussianNb(m) => m.predict_proba(rows),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::GaussianNb(m) => m.kind(),
        }
    }
}

/// Model document on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Feature order the model expects
    pub features: Vec<String>,
    pub model: ModelKind,
}

/// Scaler document on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub scaler: MinMaxScaler,
}

fn sensor_features() -> Vec<String> {
    SENSOR_COLUMNS.iter().map(ToString::to_string).collect()
}

impl ModelArtifact {
    pub fn new(model: ModelKind) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            features: sensor_features(),
            model,
        }
    }

    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let artifact: Self = load_json(path)?;
        check_header(path, artifact.version, &artifact.features)?;
        artifact
            .model
            .validate()
            .map_err(|reason| AnalysisError::unreadable(path, reason))?;
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        save_json_atomic(self, path)
    }
}

impl ScalerArtifact {
    pub fn new(scaler: MinMaxScaler) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            features: sensor_features(),
            scaler,
        }
    }

    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let artifact: Self = load_json(path)?;
        check_header(path, artifact.version, &artifact.features)?;
        if !artifact.scaler.is_consistent() {
            return Err(AnalysisError::unreadable(path, "scaler bounds are inconsistent"));
        }
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        save_json_atomic(self, path)
    }
}

fn check_header(path: &Path, version: u32, features: &[String]) -> Result<(), AnalysisError> {
    if version != ARTIFACT_VERSION {
        return Err(AnalysisError::unreadable(
            path,
            format!("unsupported artifact version {version} (expected {ARTIFACT_VERSION})"),
        ));
    }
    if features.iter().map(String::as_str).ne(SENSOR_COLUMNS) {
        return Err(AnalysisError::unreadable(
            path,
            format!("fitted on features {features:?}, expected {SENSOR_COLUMNS:?}"),
        ));
    }
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, AnalysisError> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AnalysisError::ArtifactNotFound(path.to_path_buf())
        } else {
            AnalysisError::unreadable(path, e)
        }
    })?;
    serde_json::from_slice(&data).map_err(|e| AnalysisError::unreadable(path, e))
}

/// Write JSON to disk atomically (write temp file, then rename).
pub fn save_json_atomic<T: Serialize>(value: &T, path: &Path) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
