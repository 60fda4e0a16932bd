//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::{Config, EstimatorConfig, OutputConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest precision accepted for rendered CPM values.
const MAX_PRECISION: usize = 10;

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    fn invalid(field: &str, message: String) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message,
        }
    }
}

/// Validate a complete configuration semantically.
pub fn validate_config(config: &Config) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    validate_estimator(&config.estimator)?;
    validate_output(&config.output)?;
    Ok(())
}

/// Validate estimator parameters.
pub fn validate_estimator(estimator: &EstimatorConfig) -> ValidationResult<()> {
    validate_open_unit(
        "estimator.false_positive_p",
        estimator.false_positive_p,
    )?;
    validate_open_unit(
        "estimator.table_confidence",
        estimator.table_confidence,
    )?;

    if estimator.ring_size == 0 {
        return Err(ValidationError::invalid(
            "estimator.ring_size",
            "Must be at least 1".to_string(),
        ));
    }

    validate_positive("estimator.tick_seconds", estimator.tick_seconds)?;
    validate_positive("estimator.burst_cpm_ceiling", estimator.burst_cpm_ceiling)?;

    if let Some(seconds) = estimator.adaptive_window_seconds {
        validate_positive("estimator.adaptive_window_seconds", seconds)?;
    }

    Ok(())
}

fn validate_output(output: &OutputConfig) -> ValidationResult<()> {
    if output.precision > MAX_PRECISION {
        return Err(ValidationError::invalid(
            "output.precision",
            format!("Must be at most {}, got {}", MAX_PRECISION, output.precision),
        ));
    }
    Ok(())
}

/// A probability strictly inside (0, 1).
fn validate_open_unit(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(ValidationError::invalid(
            field,
            format!("Must be in (0, 1), got {}", value),
        ));
    }
    Ok(())
}

fn validate_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::invalid(
            field,
            format!("Must be finite and > 0, got {}", value),
        ));
    }
    Ok(())
}
