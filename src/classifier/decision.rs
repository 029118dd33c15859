//! Confidence-based decision policy.
//!
//! Per-row class probabilities are averaged over the whole sample, then the
//! averaged distribution is judged:
//!
//! 1. top probability below `min_confidence_percent` → low confidence
//! 2. top minus runner-up below `min_margin_percent` → possible mixture
//! 3. otherwise the top class is reported
//!
//! The displayed confidence is always the top probability, whichever branch
//! fires. Ties between classes resolve to the label that sorts first.

use std::collections::BTreeMap;

use super::error::AnalysisError;
use super::model::TrainedModel;
use super::scaler::MinMaxScaler;
use crate::config::ClassifierConfig;
use crate::types::{
    ConfidenceVerdict, FeatureRow, VerdictKind, LOW_CONFIDENCE_LABEL, POSSIBLE_MIXTURE_LABEL,
};

/// Thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub min_confidence_percent: f64,
    pub min_margin_percent: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for DecisionPolicy {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            min_confidence_percent: config.min_confidence_percent,
            min_margin_percent: config.min_margin_percent,
        }
    }
}

/// Judge an averaged distribution. `classes[i]` owns `distribution[i]`.
pub fn decide(
    classes: &[String],
    distribution: &[f64],
    policy: &DecisionPolicy,
) -> Result<ConfidenceVerdict, AnalysisError> {
    if classes.is_empty() {
        return Err(AnalysisError::ModelOutput("model has no classes".to_string()));
    }
    if classes.len() != distribution.len() {
        return Err(AnalysisError::ModelOutput(format!(
            "{} probabilities for {} classes",
            distribution.len(),
            classes.len()
        )));
    }
    if distribution.iter().any(|p| !p.is_finite()) {
        return Err(AnalysisError::ModelOutput("non-finite probability".to_string()));
    }

    let mut ranked: Vec<(&str, f64)> = classes
        .iter()
        .map(String::as_str)
        .zip(distribution.iter().copied())
        .collect();
    // Label order first, then a stable sort by probability keeps it on ties
    ranked.sort_by(|a, b| a.0.cmp(b.0));
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (top_label, top1) = ranked[0];
    let top1_percent = top1 * 100.0;

    let kind = if top1_percent < policy.min_confidence_percent {
        VerdictKind::LowConfidence
    } else {
        match ranked.get(1) {
            Some(&(_, top2)) if (top1 - top2) * 100.0 < policy.min_margin_percent => {
                VerdictKind::PossibleMixture
            }
            // A single-class model has nothing to be confused with
            _ => VerdictKind::Known,
        }
    };

    let displayed_label = match kind {
        VerdictKind::Known => top_label.to_string(),
        VerdictKind::LowConfidence => LOW_CONFIDENCE_LABEL.to_string(),
        VerdictKind::PossibleMixture => POSSIBLE_MIXTURE_LABEL.to_string(),
    };

    Ok(ConfidenceVerdict {
        predicted_label: top_label.to_string(),
        displayed_label,
        confidence_percent: top1_percent,
        per_class_confidence: ranked
            .iter()
            .map(|(label, p)| ((*label).to_string(), p * 100.0))
            .collect::<BTreeMap<_, _>>(),
        kind,
    })
}

/// Column-wise mean of per-row probability vectors.
pub fn average_probabilities(per_row: &[Vec<f64>], num_classes: usize) -> Result<Vec<f64>, AnalysisError> {
    if per_row.is_empty() {
        return Err(AnalysisError::ModelOutput("no probability rows".to_string()));
    }
    let mut sums = vec![0.0; num_classes];
    for (i, row) in per_row.iter().enumerate() {
        if row.len() != num_classes {
            return Err(AnalysisError::ModelOutput(format!(
                "row {i} has {} probabilities for {num_classes} classes",
                row.len()
            )));
        }
        for (acc, p) in sums.iter_mut().zip(row) {
            *acc += p;
        }
    }
    let n = per_row.len() as f64;
    Ok(sums.into_iter().map(|s| s / n).collect())
}

/// Scale, predict, average and judge a sample.
pub fn classify(
    rows: &[FeatureRow],
    model: &dyn TrainedModel,
    scaler: &MinMaxScaler,
    policy: &DecisionPolicy,
) -> Result<ConfidenceVerdict, AnalysisError> {
    if rows.is_empty() {
        return Err(AnalysisError::NoSamples("sample".to_string()));
    }
    let scaled = scaler.transform_all(rows);
    let per_row = model.predict_proba(&scaled);
    if per_row.len() != rows.len() {
        return Err(AnalysisError::ModelOutput(format!(
            "{} probability rows for {} samples",
            per_row.len(),
            rows.len()
        )));
    }
    let averaged = average_probabilities(&per_row, model.classes().len())?;
    decide(model.classes(), &averaged, policy)
}
