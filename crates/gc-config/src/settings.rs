//! Configuration types.
//!
//! Every field has a default, so a partial `config.json` (or none at all)
//! is valid:
//!
//! ```json
//! {
//!   "schema_version": "1.0.0",
//!   "estimator": { "false_positive_p": 0.001, "ring_size": 100 },
//!   "output": { "precision": 2 }
//! }
//! ```

use gc_common::OutputFormat;
use serde::{Deserialize, Serialize};

/// Device tick length in seconds: 1024 cycles of a 16 MHz clock.
pub const DEFAULT_TICK_SECONDS: f64 = 1024.0 / 16_000_000.0;

/// Complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            estimator: EstimatorConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

/// Rate estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Probability that a reset heuristic fires while the rate is unchanged.
    pub false_positive_p: f64,

    /// Capacity of the long interval history; also caps the event count.
    pub ring_size: usize,

    /// Length of one device tick in seconds.
    pub tick_seconds: f64,

    /// The burst heuristic only runs while the estimate is below this CPM.
    pub burst_cpm_ceiling: f64,

    /// Two-sided confidence level of the chi-squared bound tables.
    pub table_confidence: f64,

    /// When set, the long history is periodically resized to hold roughly
    /// this many seconds of intervals.
    pub adaptive_window_seconds: Option<f64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            false_positive_p: 0.001,
            ring_size: 100,
            tick_seconds: DEFAULT_TICK_SECONDS,
            burst_cpm_ceiling: 100.0,
            table_confidence: 0.95,
            adaptive_window_seconds: None,
        }
    }
}

/// Rendering options for readings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Decimal places for CPM values.
    pub precision: usize,

    /// Echo device lines that are not count reports.
    pub passthrough: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            precision: 2,
            passthrough: true,
        }
    }
}
