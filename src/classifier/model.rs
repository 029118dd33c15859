//! Probabilistic classifiers.
//!
//! The decision engine depends only on [`TrainedModel`]: a sorted class set
//! and per-row class probabilities. [`GaussianNb`] is the classifier the
//! training routine produces.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::types::{FeatureRow, NUM_SENSORS};

/// A fitted multi-class probabilistic classifier.
pub trait TrainedModel: Send + Sync {
    /// Class labels, sorted; column order of [`predict_proba`](Self::predict_proba).
    fn classes(&self) -> &[String];

    /// One probability vector per input row, each summing to 1.
    fn predict_proba(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>>;

    /// Short model family name for reports.
    fn kind(&self) -> &'static str;
}

/// Errors from fitting a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    #[error("no training rows")]
    Empty,
    #[error("{rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

/// Gaussian naive Bayes over the four scaled sensor channels.
///
/// Each class is a product of independent normals, one per channel, with a
/// class prior equal to its share of the training rows. Variances are
/// smoothed by `var_smoothing` times the largest channel variance so that
/// a channel constant within a class does not produce a degenerate density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNb {
    classes: Vec<String>,
    priors: Vec<f64>,
    means: Vec<FeatureRow>,
    variances: Vec<FeatureRow>,
    epsilon: f64,
}

/// Variance floor when every channel of the training data is constant.
const MIN_VARIANCE: f64 = 1e-12;

impl GaussianNb {
    pub fn fit(rows: &[FeatureRow], labels: &[String], var_smoothing: f64) -> Result<Self, FitError> {
        if rows.len() != labels.len() {
            return Err(FitError::LengthMismatch {
                rows: rows.len(),
                labels: labels.len(),
            });
        }
        if rows.is_empty() {
            return Err(FitError::Empty);
        }

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();

        let epsilon = (var_smoothing * max_channel_variance(rows)).max(MIN_VARIANCE);
        let total = rows.len() as f64;

        let mut priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());

        for class in &classes {
            let members: Vec<&FeatureRow> = rows
                .iter()
                .zip(labels)
                .filter(|(_, l)| *l == class)
                .map(|(r, _)| r)
                .collect();
            let n = members.len() as f64;

            let mean: FeatureRow =
                std::array::from_fn(|i| members.iter().map(|r| r[i]).sum::<f64>() / n);
            let variance: FeatureRow = std::array::from_fn(|i| {
                let var = members.iter().map(|r| (r[i] - mean[i]).powi(2)).sum::<f64>() / n;
                var + epsilon
            });

            priors.push(n / total);
            means.push(mean);
            variances.push(variance);
        }

        tracing::debug!(classes = classes.len(), epsilon, "Gaussian naive Bayes fitted");
        Ok(Self {
            classes,
            priors,
            means,
            variances,
            epsilon,
        })
    }

    /// Structural checks for a deserialised model.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.classes.len();
        if n == 0 {
            return Err("model has no classes".to_string());
        }
        if self.priors.len() != n || self.means.len() != n || self.variances.len() != n {
            return Err(format!(
                "parameter count mismatch: {} classes, {} priors, {} means, {} variances",
                n,
                self.priors.len(),
                self.means.len(),
                self.variances.len()
            ));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err("class labels must be sorted and unique".to_string());
        }
        if self.priors.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err("class priors must be positive".to_string());
        }
        if self
            .variances
            .iter()
            .flatten()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err("variances must be positive".to_string());
        }
        if self.means.iter().flatten().any(|m| !m.is_finite()) {
            return Err("means must be finite".to_string());
        }
        Ok(())
    }

    /// Log of prior times likelihood, per class.
    fn joint_log_likelihood(&self, row: &FeatureRow) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let log_prior = self.priors[c].ln();
                (0..NUM_SENSORS).fold(log_prior, |acc, i| {
                    let density = Normal::new(self.means[c][i], self.variances[c][i].sqrt())
                        .map_or(f64::NEG_INFINITY, |n| n.ln_pdf(row[i]));
                    acc + density
                })
            })
            .collect()
    }
}

impl TrainedModel for GaussianNb {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| softmax(&self.joint_log_likelihood(row)))
            .collect()
    }

    fn kind(&self) -> &'static str {
        "gaussian_nb"
    }
}

fn max_channel_variance(rows: &[FeatureRow]) -> f64 {
    let n = rows.len() as f64;
    (0..NUM_SENSORS)
        .map(|i| {
            let mean = rows.iter().map(|r| r[i]).sum::<f64>() / n;
            rows.iter().map(|r| (r[i] - mean).powi(2)).sum::<f64>() / n
        })
        .fold(0.0, f64::max)
}

/// Normalise log-weights into probabilities (log-sum-exp).
fn softmax(log_weights: &[f64]) -> Vec<f64> {
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        // Every class impossible: fall back to uniform
        let n = log_weights.len().max(1) as f64;
        return vec![1.0 / n; log_weights.len()];
    }
    let exps: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
