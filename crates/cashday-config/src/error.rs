use std::io;

use cashday_core::CoreError;
use cashday_domain::InvalidCutoffHour;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(String),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl From<InvalidCutoffHour> for ConfigError {
    fn from(err: InvalidCutoffHour) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(io) => CoreError::Io(io),
            ConfigError::Serde(message) => CoreError::Serde(message),
            ConfigError::Invalid(message) => CoreError::Validation(message),
        }
    }
}
