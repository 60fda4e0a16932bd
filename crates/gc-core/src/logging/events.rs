//! Stable event names and pipeline stages attached to log records.

use serde::{Deserialize, Serialize};

/// Phases of a `geiger-cpm` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Opening and commanding the device.
    Device,
    /// Consuming count lines.
    Stream,
    /// Stopping the device and reporting totals.
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Device => "device",
            Stage::Stream => "stream",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Session lifecycle
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_INTERRUPTED: &str = "session.interrupted";
    pub const SESSION_FINISHED: &str = "session.finished";

    // Device
    pub const DEVICE_OPENED: &str = "device.opened";
    pub const DEVICE_STATUS: &str = "device.status";
    pub const DEVICE_STOPPED: &str = "device.stopped";
    pub const DEVICE_TIMEOUT: &str = "device.timeout";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const COMMAND_FAILED: &str = "command.failed";
}
