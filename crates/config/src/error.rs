//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid chain ID (must be non-zero)
    #[error("Invalid chain ID: chain_id must be non-zero")]
    InvalidChainId,

    /// Epoch length must be positive
    #[error("Invalid epoch: must be non-zero")]
    InvalidEpoch,

    /// Gap must fall inside the epoch
    #[error("Invalid gap: must be smaller than epoch {epoch}, got {gap}")]
    InvalidGap {
        /// Configured epoch
        epoch: u64,
        /// Configured gap
        gap: u64,
    },

    /// A block-count parameter that must be positive was zero
    #[error("Invalid {0}: must be non-zero")]
    ZeroParameter(&'static str),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: json, pretty, compact")]
    InvalidLogFormat(String),

    /// Subscriber installation failed
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
