//! geiger-cpm core library.
//!
//! Turns the count reports of a Geiger counter into a counts-per-minute
//! estimate that adapts quickly when the radiation level changes:
//!
//! - [`history`]: fixed-capacity ring of recent samples
//! - [`bounds`]: chi-squared confidence bound tables
//! - [`estimator`]: the CPM estimator and its reset heuristics
//! - [`device`]: serial line protocol of the counter firmware
//! - [`session`]: line source → estimator → rendered readings

pub mod bounds;
pub mod device;
pub mod estimator;
pub mod exit_codes;
pub mod history;
pub mod logging;
pub mod session;

pub use bounds::ConfidenceBoundTable;
pub use device::{parse_line, CountLine, DeviceCommand, DeviceLine, DeviceStatus};
pub use estimator::{LineOutcome, RateEstimator, Reading, ResetKind};
pub use history::CircularHistory;
pub use session::{MeasurementSession, SessionSummary};
