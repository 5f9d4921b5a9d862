//! Tracing subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ConfigError, ConfigResult};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global subscriber for the configured level and format.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this when a
/// subscriber is already installed returns [`ConfigError::Logging`] and leaves
/// the existing one in place.
pub fn init_tracing(config: &LoggingConfig) -> ConfigResult<()> {
    config.validate()?;

    let default_filter = format!("{},dposcore=debug", config.level.to_lowercase());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = match config.log_format()? {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(env_filter)
            .try_init(),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
