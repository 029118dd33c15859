//! Checks on a lab configuration beyond what serde enforces.
//!
//! Unknown keys (usually typos) are found by comparing the raw TOML key paths
//! against the fields `LabConfig` actually has, and reported as warnings with
//! the nearest valid key. Range checks run on the deserialized value and
//! separate fatal errors from suspicious-but-usable settings.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `LabConfig`.
///
/// Maintained by hand to match the struct hierarchy in `lab_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [acquisition]
        "acquisition",
        "acquisition.default_port",
        "acquisition.baud_rate",
        "acquisition.settle_ms",
        "acquisition.sync_timeout_ms",
        "acquisition.poll_interval_ms",
        "acquisition.idle_poll_interval_ms",
        "acquisition.read_timeout_ms",
        "acquisition.join_timeout_ms",
        // [classifier]
        "classifier",
        "classifier.min_confidence_percent",
        "classifier.min_margin_percent",
        // [artifacts]
        "artifacts",
        "artifacts.model_path",
        "artifacts.scaler_path",
        "artifacts.dataset_path",
        // [training]
        "training",
        "training.test_fraction",
        "training.seed",
        "training.var_smoothing",
        "training.label_columns",
    ];
    keys.iter().copied().collect()
}

/// Every dotted key path present in a TOML document, tables included.
///
/// `[training]\nseed = 1` gives `training` and `training.seed`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };
    table
        .iter()
        .flat_map(|(key, child)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            let nested = walk_toml_keys(child, &path);
            std::iter::once(path).chain(nested)
        })
        .collect()
}

// ============================================================================
// Suggestions
// ============================================================================

/// Single-character insertions, deletions and substitutions needed to turn
/// `from` into `to`.
fn edit_distance(from: &str, to: &str) -> usize {
    let target: Vec<char> = to.chars().collect();
    // row[j] = distance between the prefix of `from` seen so far and target[..j]
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, a) in from.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, b) in target.iter().enumerate() {
            let substitute = diagonal + usize::from(a != *b);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[target.len()]
}

/// Largest edit distance still offered as a "did you mean".
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Nearest known key to `unknown`, if any is close enough.
///
/// Equal distances go to the alphabetically first key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (edit_distance(unknown, k), k))
        .filter(|&(dist, _)| dist <= MAX_SUGGESTION_DISTANCE)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown keys
// ============================================================================

/// Warnings for keys `LabConfig` does not have.
///
/// Malformed TOML yields no warnings here; deserialization reports it.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };
    let known = known_config_keys();

    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            suggestion: suggest_correction(&key, &known),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed `LabConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_ranges(config: &super::LabConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let c = &config.classifier;
    for (name, value) in [
        ("classifier.min_confidence_percent", c.min_confidence_percent),
        ("classifier.min_margin_percent", c.min_margin_percent),
    ] {
        if !(0.0..=100.0).contains(&value) {
            errors.push(format!("{name} = {value:.1} is outside 0-100 percent"));
        }
    }
    if c.min_confidence_percent < 50.0 && c.min_confidence_percent >= 0.0 {
        warnings.push(ValidationWarning {
            field: "classifier.min_confidence_percent".to_string(),
            message: format!(
                "classifier.min_confidence_percent = {:.1} accepts verdicts that are more likely wrong than right",
                c.min_confidence_percent
            ),
            suggestion: None,
        });
    }

    let a = &config.acquisition;
    if a.baud_rate == 0 {
        errors.push("acquisition.baud_rate must be greater than 0".to_string());
    }
    if a.poll_interval_ms == 0 {
        errors.push("acquisition.poll_interval_ms must be greater than 0".to_string());
    }
    if a.idle_poll_interval_ms == 0 {
        errors.push("acquisition.idle_poll_interval_ms must be greater than 0".to_string());
    }
    if a.sync_timeout_ms == 0 {
        errors.push("acquisition.sync_timeout_ms must be greater than 0".to_string());
    }
    if a.sync_timeout_ms < a.idle_poll_interval_ms {
        warnings.push(ValidationWarning {
            field: "acquisition.sync_timeout_ms".to_string(),
            message: format!(
                "acquisition.sync_timeout_ms ({}) is shorter than one idle poll ({} ms)",
                a.sync_timeout_ms, a.idle_poll_interval_ms
            ),
            suggestion: None,
        });
    }

    let t = &config.training;
    if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
        errors.push(format!(
            "training.test_fraction = {} must be strictly between 0 and 1",
            t.test_fraction
        ));
    }
    if t.var_smoothing < 0.0 {
        errors.push(format!(
            "training.var_smoothing = {} cannot be negative",
            t.var_smoothing
        ));
    }
    if t.label_columns.is_empty() {
        errors.push("training.label_columns cannot be empty".to_string());
    }

    (errors, warnings)
}
