//! Training routine
//!
//! Labelled dataset in, (model, scaler) artifact pair out:
//!
//! 1. Seeded shuffle split into train and test rows
//! 2. Min-max scaler fitted on the training rows only
//! 3. Gaussian naive Bayes fitted on the scaled training rows
//! 4. Accuracy, per-class metrics and confusion matrix on the test rows
//! 5. Both artifacts written atomically

mod metrics;
mod split;

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::classifier::{
    FitError, GaussianNb, MinMaxScaler, ModelArtifact, ModelKind, ScalerArtifact, TrainedModel,
};
use crate::config::LabConfig;
use crate::dataset::{DatasetError, LabeledDataset};
use crate::types::FeatureRow;

pub use metrics::{evaluate, ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use split::{train_test_split, Split};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("need at least 2 labelled rows to split, found {0}")]
    TooFewRows(usize),

    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("cannot save {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inputs and outputs of one training run.
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub label_columns: Vec<String>,
    pub test_fraction: f64,
    pub seed: u64,
    pub var_smoothing: f64,
}

impl TrainingOptions {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            dataset_path: config.artifacts.dataset_path.clone(),
            model_path: config.artifacts.model_path.clone(),
            scaler_path: config.artifacts.scaler_path.clone(),
            label_columns: config.training.label_columns.clone(),
            test_fraction: config.training.test_fraction,
            seed: config.training.seed,
            var_smoothing: config.training.var_smoothing,
        }
    }
}

/// Summary of a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub label_column: String,
    pub classes: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub evaluation: ClassificationReport,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
}

/// Fitted pair plus its evaluation, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct FittedPipeline {
    pub model: GaussianNb,
    pub scaler: MinMaxScaler,
    pub split: Split,
    pub evaluation: ClassificationReport,
}

fn select(rows: &[FeatureRow], indices: &[usize]) -> Vec<FeatureRow> {
    indices.iter().map(|&i| rows[i]).collect()
}

fn select_labels(labels: &[String], indices: &[usize]) -> Vec<String> {
    indices.iter().map(|&i| labels[i].clone()).collect()
}

/// Most probable class per row; ties go to the class that sorts first.
pub fn predict_labels(model: &dyn TrainedModel, rows: &[FeatureRow]) -> Vec<String> {
    let classes = model.classes();
    model
        .predict_proba(rows)
        .iter()
        .map(|p| {
            let mut best = 0;
            for (i, v) in p.iter().enumerate() {
                if *v > p[best] {
                    best = i;
                }
            }
            classes.get(best).cloned().unwrap_or_default()
        })
        .collect()
}

/// Split, scale, fit and evaluate.
pub fn fit_pipeline(
    dataset: &LabeledDataset,
    test_fraction: f64,
    seed: u64,
    var_smoothing: f64,
) -> Result<FittedPipeline, TrainingError> {
    let split = train_test_split(dataset.len(), test_fraction, seed)
        .ok_or(TrainingError::TooFewRows(dataset.len()))?;

    let train_rows = select(&dataset.rows, &split.train);
    let train_labels = select_labels(&dataset.labels, &split.train);
    let scaler = MinMaxScaler::fit(&train_rows).ok_or(FitError::Empty)?;
    let model = GaussianNb::fit(&scaler.transform_all(&train_rows), &train_labels, var_smoothing)?;

    let test_rows = scaler.transform_all(&select(&dataset.rows, &split.test));
    let test_labels = select_labels(&dataset.labels, &split.test);
    let predicted = predict_labels(&model, &test_rows);
    let evaluation = evaluate(model.classes(), &test_labels, &predicted);

    Ok(FittedPipeline {
        model,
        scaler,
        split,
        evaluation,
    })
}

/// Full training run: load, fit, evaluate, save.
pub fn train(options: &TrainingOptions) -> Result<TrainingReport, TrainingError> {
    let dataset = LabeledDataset::load(&options.dataset_path, &options.label_columns)?;
    info!(
        dataset = %options.dataset_path.display(),
        rows = dataset.len(),
        classes = dataset.classes().len(),
        "Training started"
    );

    let fitted = fit_pipeline(&dataset, options.test_fraction, options.seed, options.var_smoothing)?;
    let classes = fitted.model.classes().to_vec();

    ModelArtifact::new(ModelKind::GaussianNb(fitted.model))
        .save(&options.model_path)
        .map_err(|source| TrainingError::Save {
            path: options.model_path.clone(),
            source,
        })?;
    ScalerArtifact::new(fitted.scaler)
        .save(&options.scaler_path)
        .map_err(|source| TrainingError::Save {
            path: options.scaler_path.clone(),
            source,
        })?;

    info!(
        accuracy = fitted.evaluation.accuracy,
        model = %options.model_path.display(),
        scaler = %options.scaler_path.display(),
        "Training finished, artifacts saved"
    );

    Ok(TrainingReport {
        label_column: dataset.label_column,
        classes,
        train_rows: fitted.split.train.len(),
        test_rows: fitted.split.test.len(),
        evaluation: fitted.evaluation,
        model_path: options.model_path.clone(),
        scaler_path: options.scaler_path.clone(),
    })
}
