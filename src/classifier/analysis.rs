//! Sample analysis: artifacts in, verdict out.
//!
//! Loads the (model, scaler) pair and an unknown-sample table, runs the
//! decision engine, and reports progress on the status channel. Errors go to
//! both the status channel and the caller.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use super::artifacts::{ModelArtifact, ScalerArtifact};
use super::decision::{classify, DecisionPolicy};
use super::error::AnalysisError;
use super::model::TrainedModel;
use super::profile::SensorProfiles;
use crate::acquisition::StatusSink;
use crate::config::LabConfig;
use crate::dataset::{ColumnMapping, SampleTable};
use crate::types::ConfidenceVerdict;

/// Inputs of one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub sample_path: PathBuf,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    /// Training dataset for class profiles; skipped when `None`
    pub dataset_path: Option<PathBuf>,
    pub label_columns: Vec<String>,
    pub policy: DecisionPolicy,
}

impl AnalysisRequest {
    /// Request for `sample_path` with artifact locations and thresholds
    /// taken from `config`.
    pub fn from_config(sample_path: impl Into<PathBuf>, config: &LabConfig) -> Self {
        Self {
            sample_path: sample_path.into(),
            model_path: config.artifacts.model_path.clone(),
            scaler_path: config.artifacts.scaler_path.clone(),
            dataset_path: Some(config.artifacts.dataset_path.clone()),
            label_columns: config.training.label_columns.clone(),
            policy: DecisionPolicy::from(&config.classifier),
        }
    }
}

/// Everything a presentation layer needs to show one result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub sample_path: PathBuf,
    pub rows: usize,
    /// Columns were renamed positionally (or the file had no header)
    pub positional_columns: bool,
    pub model_kind: String,
    pub classes: Vec<String>,
    pub verdict: ConfidenceVerdict,
    pub profiles: Option<SensorProfiles>,
}

/// Analyse one sample file.
pub fn analyze_file(request: &AnalysisRequest, status: &StatusSink) -> Result<AnalysisReport, AnalysisError> {
    let result = run_analysis(request, status);
    if let Err(e) = &result {
        warn!(sample = %request.sample_path.display(), error = %e, "Analysis failed");
        status.error(format!("Analysis failed: {e}"));
    }
    result
}

fn run_analysis(request: &AnalysisRequest, status: &StatusSink) -> Result<AnalysisReport, AnalysisError> {
    let model = ModelArtifact::load(&request.model_path)?.model;
    let scaler = ScalerArtifact::load(&request.scaler_path)?.scaler;
    status.info(format!(
        "Model '{}' and scaler '{}' loaded",
        request.model_path.display(),
        request.scaler_path.display()
    ));

    let table = SampleTable::load(&request.sample_path)?;
    let positional = table.mapping != ColumnMapping::ByName;
    if positional {
        let msg = match table.mapping {
            ColumnMapping::Headerless => "Sample file has no header; reading columns as MQ3,MQ5,MQ6,MQ8",
            _ => "Sample columns not named MQ3,MQ5,MQ6,MQ8; renaming them positionally",
        };
        warn!(sample = %request.sample_path.display(), header = ?table.header, "{}", msg);
        status.warn(msg);
    }

    let verdict = classify(&table.rows, &model, &scaler, &request.policy)?;
    info!(
        sample = %request.sample_path.display(),
        rows = table.rows.len(),
        label = %verdict.displayed_label,
        confidence = verdict.confidence_percent,
        kind = %verdict.kind,
        "Sample classified"
    );
    status.info(format!(
        "Result: {} ({:.2}%)",
        verdict.displayed_label, verdict.confidence_percent
    ));

    let mut profiles = SensorProfiles::for_sample(&table.rows, &scaler);
    if let Some(dataset_path) = &request.dataset_path {
        profiles = profiles.map(|sample_profile| {
            match sample_profile
                .clone()
                .with_classes_from(dataset_path, &request.label_columns, &scaler)
            {
                Ok(with_classes) => with_classes,
                Err(e) => {
                    warn!(dataset = %dataset_path.display(), error = %e, "Class profiles unavailable");
                    status.warn(format!("Class profiles unavailable: {e}"));
                    sample_profile
                }
            }
        });
    }

    Ok(AnalysisReport {
        sample_path: request.sample_path.clone(),
        rows: table.rows.len(),
        positional_columns: positional,
        model_kind: model.kind().to_string(),
        classes: model.classes().to_vec(),
        verdict,
        profiles,
    })
}
