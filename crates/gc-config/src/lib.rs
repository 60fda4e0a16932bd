//! geiger-cpm configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `config.json`
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation of estimator parameters

pub mod load;
pub mod resolve;
pub mod settings;
pub mod validate;

pub use load::{load_config, ConfigError, LoadedConfig};
pub use resolve::{resolve_config, ConfigSource};
pub use settings::{Config, EstimatorConfig, OutputConfig};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
