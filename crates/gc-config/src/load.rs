//! Configuration loading.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::resolve::{resolve_config, ConfigSource};
use crate::settings::Config;
use crate::validate::{validate_config, ValidationError};

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for gc_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ValidationError(ValidationError::InvalidValue { field, message }) => {
                gc_common::Error::InvalidParameter { field, message }
            }
            other => gc_common::Error::Config(other.to_string()),
        }
    }
}

/// Configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Resolve, read, and validate the configuration.
///
/// Falls back to [`Config::default`] when no file is found through the
/// environment or XDG lookup. A CLI path that does not exist is an error.
pub fn load_config(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let (path, source) = resolve_config(cli_path);

    let config = match &path {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    validate_config(&config)?;

    Ok(LoadedConfig {
        config,
        path,
        source,
    })
}

/// Read and parse a config file without validating it.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}
