//! Lab Configuration - acquisition, decision and training tunables as TOML
//!
//! Each struct implements `Default` with the values in [`super::defaults`],
//! so a missing config file reproduces the stock behaviour exactly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "ENOSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "enose.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a lab station.
///
/// Load with `LabConfig::load()` which searches:
/// 1. `$ENOSE_CONFIG` env var
/// 2. `./enose.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabConfig {
    /// Serial acquisition timing
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Verdict thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Default artifact locations
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Training routine parameters
    #[serde(default)]
    pub training: TrainingConfig,
}

impl LabConfig {
    /// Load configuration using the standard search order:
    /// 1. `$ENOSE_CONFIG` environment variable
    /// 2. `./enose.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded lab config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded lab config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file (used by `enose config` to emit a starter file).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Lab config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Returns every violation at once rather than the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Timing of the serial acquisition loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Port used when the CLI is not given one
    pub default_port: String,
    pub baud_rate: u32,
    /// Device reboot wait after opening the port
    pub settle_ms: u64,
    /// Window for the first valid data line
    pub sync_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub idle_poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    /// Shutdown wait for the worker before it is abandoned
    pub join_timeout_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_port: defaults::DEFAULT_PORT.to_string(),
            baud_rate: defaults::DEFAULT_BAUD_RATE,
            settle_ms: defaults::DEVICE_SETTLE_MS,
            sync_timeout_ms: defaults::SYNC_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            idle_poll_interval_ms: defaults::IDLE_POLL_INTERVAL_MS,
            read_timeout_ms: defaults::SERIAL_READ_TIMEOUT_MS,
            join_timeout_ms: defaults::JOIN_TIMEOUT_MS,
        }
    }
}

impl AcquisitionConfig {
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Thresholds of the known / indefinite decision policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub min_confidence_percent: f64,
    pub min_margin_percent: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence_percent: defaults::MIN_CONFIDENCE_PERCENT,
            min_margin_percent: defaults::MIN_MARGIN_PERCENT,
        }
    }
}

/// Default artifact locations used by `train` and `analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub dataset_path: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::MODEL_PATH),
            scaler_path: PathBuf::from(defaults::SCALER_PATH),
            dataset_path: PathBuf::from(defaults::DATASET_PATH),
        }
    }
}

/// Training routine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub var_smoothing: f64,
    /// Candidate names for the label column, first match wins
    pub label_columns: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: defaults::TEST_FRACTION,
            seed: defaults::SPLIT_SEED,
            var_smoothing: defaults::VAR_SMOOTHING,
            label_columns: defaults::LABEL_COLUMNS.iter().map(ToString::to_string).collect(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Configuration load / validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}
