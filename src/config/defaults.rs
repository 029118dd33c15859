//! System-wide default constants.
//!
//! Centralises the tunables of the acquisition loop, the decision policy and
//! the training routine. Grouped by subsystem for easy discovery.

// ============================================================================
// Acquisition
// ============================================================================

/// Default serial baud rate of the sensor firmware.
pub const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Default serial port name shown to operators.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Time the microcontroller needs to reboot after the port is opened (ms).
///
/// Opening the port toggles DTR, which resets most Arduino-class boards.
pub const DEVICE_SETTLE_MS: u64 = 2_000;

/// Window in which the first valid data line must arrive (ms).
pub const SYNC_TIMEOUT_MS: u64 = 10_000;

/// Sleep between polls while recording, and after a discarded sync line (ms).
///
/// Upper bound on stop-signal latency.
pub const POLL_INTERVAL_MS: u64 = 50;

/// Sleep between polls while synchronising with an empty input buffer (ms).
pub const IDLE_POLL_INTERVAL_MS: u64 = 100;

/// Per-read timeout handed to the serial driver (ms).
pub const SERIAL_READ_TIMEOUT_MS: u64 = 10;

/// How long the controlling flow waits for a worker on shutdown (ms).
pub const JOIN_TIMEOUT_MS: u64 = 1_000;

/// Longest line kept in the receive buffer before it is dropped as garbage.
pub const MAX_LINE_BYTES: usize = 1_024;

// ============================================================================
// Decision Policy
// ============================================================================

/// Below this top-class confidence (percent) the verdict is indefinite.
pub const MIN_CONFIDENCE_PERCENT: f64 = 75.0;

/// Below this top-1 / top-2 gap (percentage points) the verdict is a
/// possible mixture.
pub const MIN_MARGIN_PERCENT: f64 = 10.0;

// ============================================================================
// Artifacts
// ============================================================================

/// Default trained-model artifact path.
pub const MODEL_PATH: &str = "modelo_nariz_eletronico.json";

/// Default fitted-scaler artifact path.
pub const SCALER_PATH: &str = "scaler_nariz_eletronico.json";

/// Default labelled training dataset path.
pub const DATASET_PATH: &str = "dataset_nariz_eletronico.csv";

// ============================================================================
// Training
// ============================================================================

/// Fraction of the dataset held out for evaluation.
pub const TEST_FRACTION: f64 = 0.2;

/// Seed for the train/test shuffle.
pub const SPLIT_SEED: u64 = 42;

/// Portion of the largest feature variance added to every class variance.
pub const VAR_SMOOTHING: f64 = 1e-9;

/// Accepted names for the label column, in lookup order.
pub const LABEL_COLUMNS: &[&str] = &["Tipo_álcool", "alcool", "label"];
