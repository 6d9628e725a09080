//! cashday-config
//!
//! Persistent per-user closure preferences.
//! Owns disk persistence for [`UserSettings`].

pub mod error;
pub mod manager;

pub use cashday_domain::{ClosureConflictBehavior, SettingsPatch, UserSettings};
pub use error::ConfigError;
pub use manager::SettingsManager;
