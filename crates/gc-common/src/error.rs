//! Error types for geiger-cpm.
//!
//! Errors carry a stable numeric code, a category, and a short headline
//! for human output. Agents reading JSONL output get a [`StructuredError`]:
//! ```json
//! {
//!   "code": 20,
//!   "category": "device",
//!   "message": "cannot open device /dev/ttyACM0: permission denied",
//!   "context": { "path": "/dev/ttyACM0" }
//! }
//! ```
//!
//! "Not enough history yet" is never an error: averages return `Option`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for geiger-cpm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or parameter errors.
    Config,
    /// Counting device access errors.
    Device,
    /// Numerical failures while building confidence bounds.
    Numerical,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Device => write!(f, "device"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for geiger-cpm.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid value for {field}: {message}")]
    InvalidParameter { field: String, message: String },

    // Device errors (20-29)
    #[error("cannot open device {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    #[error("device command failed: {0}")]
    DeviceCommand(String),

    // Numerical errors (30-39)
    #[error("numerical failure: {0}")]
    Numerical(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Device errors
    /// - 30-39: Numerical errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidParameter { .. } => 11,
            Error::DeviceUnavailable { .. } => 20,
            Error::DeviceCommand(_) => 21,
            Error::Numerical(_) => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidParameter { .. } => ErrorCategory::Config,
            Error::DeviceUnavailable { .. } | Error::DeviceCommand(_) => ErrorCategory::Device,
            Error::Numerical(_) => ErrorCategory::Numerical,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidParameter { .. } => "Invalid Parameter",
            Error::DeviceUnavailable { .. } => "Device Unavailable",
            Error::DeviceCommand(_) => "Device Command Failed",
            Error::Numerical(_) => "Numerical Failure",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidParameter { .. } => {
                "Run 'geiger-cpm check' to validate configuration, or fix the offending value."
            }
            Error::DeviceUnavailable { .. } => {
                "Check the device path and that your user may open it (e.g. membership of 'dialout')."
            }
            Error::DeviceCommand(_) => "Reconnect the counter and retry.",
            Error::Numerical(_) => {
                "Use the default table confidence (0.95) or a smaller ring size."
            }
            Error::Io(_) => "Check that the input exists and is readable.",
            Error::Json(_) => "Check the configuration file syntax with 'jq . <file>'.",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Additional structured context (e.g. device path, field name).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidParameter { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::DeviceUnavailable { path, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category_ranges() {
        let cases = [
            (Error::Config("x".into()), 10..20),
            (
                Error::InvalidParameter {
                    field: "ring_size".into(),
                    message: "must be >= 1".into(),
                },
                10..20,
            ),
            (
                Error::DeviceUnavailable {
                    path: "/dev/ttyACM0".into(),
                    reason: "busy".into(),
                },
                20..30,
            ),
            (Error::Numerical("nan".into()), 30..40),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
                60..70,
            ),
        ];
        for (err, range) in cases {
            assert!(range.contains(&err.code()), "{:?} -> {}", err, err.code());
        }
    }

    #[test]
    fn category_matches_variant() {
        assert_eq!(Error::Config("x".into()).category(), ErrorCategory::Config);
        assert_eq!(
            Error::DeviceCommand("write".into()).category(),
            ErrorCategory::Device
        );
        assert_eq!(
            Error::Numerical("nan".into()).category(),
            ErrorCategory::Numerical
        );
    }

    #[test]
    fn structured_error_carries_context() {
        let err = Error::DeviceUnavailable {
            path: "/dev/ttyACM0".into(),
            reason: "permission denied".into(),
        };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 20);
        assert_eq!(structured.category, ErrorCategory::Device);
        assert_eq!(structured.context["path"], "/dev/ttyACM0");

        let json: serde_json::Value = serde_json::from_str(&structured.to_json()).unwrap();
        assert_eq!(json["category"], "device");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("permission denied"));
    }

    #[test]
    fn io_errors_convert() {
        fn read() -> Result<()> {
            let raw: std::io::Result<()> =
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
            raw?;
            Ok(())
        }
        let err = read().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Io);
        assert_eq!(err.headline(), "I/O Error");
    }
}
