//! Sensor profiles for the radar overlay.
//!
//! The unknown sample's mean reading and each known class's mean reading,
//! all passed through the model's own scaler so they share one axis range.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::scaler::MinMaxScaler;
use crate::dataset::{mean_row, DatasetError, LabeledDataset};
use crate::types::{FeatureRow, SENSOR_COLUMNS};

/// Scaled mean profiles, in sensor column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorProfiles {
    pub channels: Vec<String>,
    pub sample: FeatureRow,
    /// Empty when no training dataset was available
    pub classes: BTreeMap<String, FeatureRow>,
}

impl SensorProfiles {
    /// Profile of the sample alone.
    pub fn for_sample(rows: &[FeatureRow], scaler: &MinMaxScaler) -> Option<Self> {
        let mean = mean_row(rows)?;
        Some(Self {
            channels: SENSOR_COLUMNS.iter().map(ToString::to_string).collect(),
            sample: scaler.transform(&mean),
            classes: BTreeMap::new(),
        })
    }

    /// Add the per-class profiles of a training dataset.
    pub fn with_classes(mut self, dataset: &LabeledDataset, scaler: &MinMaxScaler) -> Self {
        self.classes = dataset
            .class_means()
            .into_iter()
            .map(|(label, mean)| (label, scaler.transform(&mean)))
            .collect();
        self
    }

    /// Load the dataset at `path` and add its class profiles.
    pub fn with_classes_from(
        self,
        path: &Path,
        label_columns: &[String],
        scaler: &MinMaxScaler,
    ) -> Result<Self, DatasetError> {
        let dataset = LabeledDataset::load(path, label_columns)?;
        Ok(self.with_classes(&dataset, scaler))
    }
}
