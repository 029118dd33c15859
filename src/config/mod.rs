//! Lab Configuration Module
//!
//! Provides the acquisition, decision-policy and training settings loaded
//! from a TOML file, replacing hardcoded tunables with operator values.
//!
//! ## Loading Order
//!
//! 1. `ENOSE_CONFIG` environment variable (path to TOML file)
//! 2. `enose.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(LabConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().classifier.min_confidence_percent;
//! ```

mod lab_config;
pub mod defaults;
pub mod validation;

pub use lab_config::*;

use std::sync::OnceLock;

/// Global lab configuration, initialized once at startup.
static LAB_CONFIG: OnceLock<LabConfig> = OnceLock::new();

/// Initialize the global lab configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: LabConfig) {
    if LAB_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global lab configuration.
///
/// Returns the built-in defaults when `init()` has not been called, so
/// library users and tests never have to initialise it.
pub fn get() -> &'static LabConfig {
    LAB_CONFIG.get_or_init(LabConfig::default)
}

