use cashday_config::ConfigError;
use cashday_core::CoreError;
use thiserror::Error;

/// Error type surfaced by the session facade.
#[derive(Debug, Error)]
pub enum CashdayError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Background task stopped: {0}")]
    TaskStopped(String),
}

impl CashdayError {
    /// True when the failure came from the persistence layer and may be retried.
    pub fn is_persistence(&self) -> bool {
        match self {
            CashdayError::Core(err) => err.is_persistence(),
            CashdayError::Config(ConfigError::Io(_)) => true,
            _ => false,
        }
    }
}
