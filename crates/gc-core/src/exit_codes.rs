//! Exit codes for the `geiger-cpm` CLI.
//!
//! Exit code ranges:
//! - 0-6: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use gc_common::{Error, ErrorCategory};

/// Process exit codes. Stable for scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Source exhausted or command completed.
    Clean = 0,

    /// Stopped by Ctrl-C.
    Interrupted = 6,

    /// Invalid arguments
    ArgsError = 10,

    /// Configuration missing, unparsable, or out of range
    ConfigError = 11,

    /// Device could not be opened or commanded
    DeviceError = 12,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error on the input or output stream
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-6 report how a run ended, not a failure.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Name for JSON error output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Interrupted => "OK_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DeviceError => "ERR_DEVICE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Device => ExitCode::DeviceError,
            ErrorCategory::Numerical => ExitCode::InternalError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::Clean.is_operational());
        assert!(ExitCode::Interrupted.is_operational());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::DeviceError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::ArgsError.is_internal_error());
    }

    #[test]
    fn errors_map_by_category() {
        let err = Error::DeviceUnavailable {
            path: "/dev/ttyACM0".to_string(),
            reason: "no such file".to_string(),
        };
        assert_eq!(ExitCode::from(&err), ExitCode::DeviceError);
        assert_eq!(ExitCode::from(&Error::Config("bad".to_string())), ExitCode::ConfigError);
        assert_eq!(
            ExitCode::from(&Error::Numerical("nan".to_string())),
            ExitCode::InternalError
        );
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }
}
