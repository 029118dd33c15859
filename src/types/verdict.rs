//! Classification verdict types shared by the decision engine and the
//! presentation layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Displayed label when the best class is not confident enough.
pub const LOW_CONFIDENCE_LABEL: &str = "INDEFINIDA (Confiança Baixa)";

/// Displayed label when the two best classes are too close to call.
pub const POSSIBLE_MIXTURE_LABEL: &str = "INDEFINIDA (Possível Mistura)";

/// Outcome category of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// The top class passed both checks
    Known,
    /// Top-class probability below the confidence threshold
    LowConfidence,
    /// Confident top class, but the runner-up is within the margin
    PossibleMixture,
}

impl VerdictKind {
    pub const fn is_known(self) -> bool {
        matches!(self, Self::Known)
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known => write!(f, "Known"),
            Self::LowConfidence => write!(f, "LowConfidence"),
            Self::PossibleMixture => write!(f, "PossibleMixture"),
        }
    }
}

/// Result of classifying one unknown sample.
///
/// `per_class_confidence` holds the full averaged distribution in percent,
/// keyed by class label, so the ambiguity can be drawn downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceVerdict {
    /// Class with the highest averaged probability
    pub predicted_label: String,
    /// `predicted_label`, or one of the two indefinite labels
    pub displayed_label: String,
    /// Top-class probability in percent
    pub confidence_percent: f64,
    pub per_class_confidence: BTreeMap<String, f64>,
    pub kind: VerdictKind,
}

impl ConfidenceVerdict {
    /// Classes ordered by confidence, highest first; ties keep label order.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .per_class_confidence
            .iter()
            .map(|(label, pct)| (label.as_str(), *pct))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}
