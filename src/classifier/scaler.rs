//! Min-max feature scaling.
//!
//! Maps each sensor channel onto `[0, 1]` using the minimum and maximum seen
//! in the training split. Values outside the fitted range are not clipped,
//! so an unknown sample stronger than anything in training lands above 1.

use serde::{Deserialize, Serialize};

use crate::types::{FeatureRow, NUM_SENSORS};

/// Fitted per-channel min-max transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: FeatureRow,
    data_max: FeatureRow,
}

impl MinMaxScaler {
    /// Fit to `rows`; `None` when there is nothing to fit.
    pub fn fit(rows: &[FeatureRow]) -> Option<Self> {
        let first = rows.first()?;
        let mut data_min = *first;
        let mut data_max = *first;
        for row in &rows[1..] {
            for i in 0..NUM_SENSORS {
                data_min[i] = data_min[i].min(row[i]);
                data_max[i] = data_max[i].max(row[i]);
            }
        }
        Some(Self { data_min, data_max })
    }

    pub const fn data_min(&self) -> &FeatureRow {
        &self.data_min
    }

    pub const fn data_max(&self) -> &FeatureRow {
        &self.data_max
    }

    pub fn transform(&self, row: &FeatureRow) -> FeatureRow {
        std::array::from_fn(|i| {
            let range = self.data_max[i] - self.data_min[i];
            // Constant channel: shift only
            let scale = if range == 0.0 { 1.0 } else { range };
            (row[i] - self.data_min[i]) / scale
        })
    }

    pub fn transform_all(&self, rows: &[FeatureRow]) -> Vec<FeatureRow> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Every bound is a finite number and min does not exceed max.
    pub fn is_consistent(&self) -> bool {
        self.data_min
            .iter()
            .zip(&self.data_max)
            .all(|(lo, hi)| lo.is_finite() && hi.is_finite() && lo <= hi)
    }
}
