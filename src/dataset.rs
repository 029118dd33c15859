//! CSV table loading
//!
//! Two shapes of table pass through here:
//!
//! - **Sample tables**: a recorded (or hand-made) unknown sample. Must carry
//!   the four sensor columns by name, in any order and with extra columns
//!   allowed, or have exactly four columns which are then taken positionally.
//! - **Labelled datasets**: training data, the sensor columns plus one label
//!   column.
//!
//! Both are small enough to read whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{FeatureRow, NUM_SENSORS, SENSOR_COLUMNS};

/// Errors while loading a CSV table.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Required columns missing and no positional fallback possible
    #[error("{source_name}: expected columns {expected:?} (or exactly 4 columns), found {found:?}")]
    SchemaMismatch {
        source_name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{source_name}: line {line}: {message}")]
    InvalidRow {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("{0}: no data rows")]
    NoRows(String),
}

// ============================================================================
// Field splitting
// ============================================================================

/// Break one CSV row into trimmed fields.
///
/// Double-quoted fields may contain commas; `""` inside quotes is a literal
/// quote.
pub fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut just_closed = false;

    for ch in line.chars() {
        let closed_before = std::mem::replace(&mut just_closed, false);
        match ch {
            '"' if quoted => {
                quoted = false;
                just_closed = true;
            }
            // Second quote of a `""` pair: literal quote, still inside
            '"' if closed_before => {
                field.push('"');
                quoted = true;
            }
            '"' => quoted = true,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(ch),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn read_table(path: &Path) -> Result<String, DatasetError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DatasetError::NotFound(path.to_path_buf())
        } else {
            DatasetError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Non-empty lines with their 1-based line numbers.
fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_start_matches('\u{feff}').trim()))
        .filter(|(_, l)| !l.is_empty())
}

/// Index of each sensor column in `header`, if all four are present.
fn sensor_indices(header: &[String]) -> Option<[usize; NUM_SENSORS]> {
    let mut indices = [0_usize; NUM_SENSORS];
    for (slot, name) in indices.iter_mut().zip(SENSOR_COLUMNS) {
        *slot = header.iter().position(|h| h.eq_ignore_ascii_case(name))?;
    }
    Some(indices)
}

fn parse_features(
    fields: &[String],
    indices: &[usize; NUM_SENSORS],
    source_name: &str,
    line: usize,
) -> Result<FeatureRow, DatasetError> {
    let invalid = |message: String| DatasetError::InvalidRow {
        source_name: source_name.to_string(),
        line,
        message,
    };

    let mut row = [0.0; NUM_SENSORS];
    for ((value, &idx), name) in row.iter_mut().zip(indices).zip(SENSOR_COLUMNS) {
        let cell = fields
            .get(idx)
            .ok_or_else(|| invalid(format!("missing {name} value")))?;
        let parsed: f64 = cell
            .parse()
            .map_err(|_| invalid(format!("{name} value '{cell}' is not a number")))?;
        if !parsed.is_finite() {
            return Err(invalid(format!("{name} value '{cell}' is not finite")));
        }
        *value = parsed;
    }
    Ok(row)
}

// ============================================================================
// Sample tables
// ============================================================================

/// How the sensor columns of a sample table were located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMapping {
    /// Found by name
    ByName,
    /// Exactly four columns with other names, taken in order
    Positional,
    /// Exactly four columns and no header at all; first line is data
    Headerless,
}

/// Feature rows of an unknown sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    pub rows: Vec<FeatureRow>,
    pub mapping: ColumnMapping,
    /// Header as read (empty for headerless tables)
    pub header: Vec<String>,
}

impl SampleTable {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = read_table(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse CSV text; `source_name` only labels errors.
    pub fn parse(text: &str, source_name: &str) -> Result<Self, DatasetError> {
        let mut lines = numbered_lines(text);
        let Some((header_line, header_text)) = lines.next() else {
            return Err(DatasetError::NoRows(source_name.to_string()));
        };
        let header = csv_split(header_text);

        let positional: [usize; NUM_SENSORS] = std::array::from_fn(|i| i);
        let (indices, mapping) = match sensor_indices(&header) {
            Some(indices) => (indices, ColumnMapping::ByName),
            None if header.len() == NUM_SENSORS => {
                if header.iter().all(|h| h.parse::<f64>().is_ok()) {
                    (positional, ColumnMapping::Headerless)
                } else {
                    (positional, ColumnMapping::Positional)
                }
            }
            None => {
                return Err(DatasetError::SchemaMismatch {
                    source_name: source_name.to_string(),
                    expected: SENSOR_COLUMNS.iter().map(ToString::to_string).collect(),
                    found: header,
                })
            }
        };

        let mut rows = Vec::new();
        if mapping == ColumnMapping::Headerless {
            rows.push(parse_features(&header, &indices, source_name, header_line)?);
        }
        for (line, text) in lines {
            rows.push(parse_features(&csv_split(text), &indices, source_name, line)?);
        }

        if rows.is_empty() {
            return Err(DatasetError::NoRows(source_name.to_string()));
        }

        tracing::debug!(source = source_name, rows = rows.len(), ?mapping, "Sample table loaded");
        Ok(Self {
            rows,
            mapping,
            header: if mapping == ColumnMapping::Headerless {
                Vec::new()
            } else {
                header
            },
        })
    }
}

// ============================================================================
// Labelled datasets
// ============================================================================

/// Training data: feature rows with one class label each.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    pub rows: Vec<FeatureRow>,
    pub labels: Vec<String>,
    /// Name of the column the labels came from
    pub label_column: String,
}

impl LabeledDataset {
    /// Load a dataset; the first of `label_columns` present in the header
    /// is the label.
    pub fn load(path: &Path, label_columns: &[String]) -> Result<Self, DatasetError> {
        let text = read_table(path)?;
        Self::parse(&text, &path.display().to_string(), label_columns)
    }

    pub fn parse(text: &str, source_name: &str, label_columns: &[String]) -> Result<Self, DatasetError> {
        let mut lines = numbered_lines(text);
        let Some((_, header_text)) = lines.next() else {
            return Err(DatasetError::NoRows(source_name.to_string()));
        };
        let header = csv_split(header_text);

        let label = label_columns
            .iter()
            .find_map(|name| header.iter().position(|h| h == name).map(|idx| (idx, name)));
        let (Some(indices), Some((label_idx, label_name))) = (sensor_indices(&header), label) else {
            let mut expected: Vec<String> = SENSOR_COLUMNS.iter().map(ToString::to_string).collect();
            expected.push(format!("one of {label_columns:?}"));
            return Err(DatasetError::SchemaMismatch {
                source_name: source_name.to_string(),
                expected,
                found: header,
            });
        };

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (line, text) in lines {
            let fields = csv_split(text);
            let row = parse_features(&fields, &indices, source_name, line)?;
            let label = fields
                .get(label_idx)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| DatasetError::InvalidRow {
                    source_name: source_name.to_string(),
                    line,
                    message: format!("missing {label_name} value"),
                })?;
            rows.push(row);
            labels.push(label.clone());
        }

        if rows.is_empty() {
            return Err(DatasetError::NoRows(source_name.to_string()));
        }

        tracing::info!(
            source = source_name,
            rows = rows.len(),
            label_column = %label_name,
            "Labelled dataset loaded"
        );
        Ok(Self {
            rows,
            labels,
            label_column: label_name.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct labels, sorted.
    pub fn classes(&self) -> Vec<String> {
        let mut classes = self.labels.clone();
        classes.sort();
        classes.dedup();
        classes
    }

    /// Mean feature row per class.
    pub fn class_means(&self) -> BTreeMap<String, FeatureRow> {
        let mut sums: BTreeMap<String, (FeatureRow, usize)> = BTreeMap::new();
        for (row, label) in self.rows.iter().zip(&self.labels) {
            let entry = sums.entry(label.clone()).or_insert(([0.0; NUM_SENSORS], 0));
            for (acc, v) in entry.0.iter_mut().zip(row) {
                *acc += v;
            }
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(label, (sum, n))| (label, sum.map(|s| s / n as f64)))
            .collect()
    }
}

/// Column-wise mean of `rows`; `None` when empty.
pub fn mean_row(rows: &[FeatureRow]) -> Option<FeatureRow> {
    if rows.is_empty() {
        return None;
    }
    let mut mean = [0.0; NUM_SENSORS];
    for row in rows {
        for (acc, v) in mean.iter_mut().zip(row) {
            *acc += v;
        }
    }
    Some(mean.map(|s| s / rows.len() as f64))
}
