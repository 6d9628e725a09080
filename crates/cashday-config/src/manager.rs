use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;

use cashday_core::{CoreError, SettingsStore};
use cashday_domain::{SettingsPatch, UserSettings};

use crate::ConfigError;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Stores one user's [`UserSettings`] as a JSON file.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }

    /// Uses `<base>/config/settings.json`, creating the directory.
    pub fn with_base_dir(base: PathBuf) -> Result<Self, ConfigError> {
        let config_dir = base.join("config");
        fs::create_dir_all(&config_dir)?;
        Ok(Self::new(config_dir.join(SETTINGS_FILE_NAME)))
    }

    /// Per-user data directory, `<data dir>/cashday/<user>`.
    pub fn default_base_dir(user_id: &str) -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cashday")
            .join(user_id)
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Reads the stored settings, or `None` when nothing has been saved yet.
    ///
    /// A stored cutoff hour outside 0..=23 is an error.
    pub fn load_existing(&self) -> Result<Option<UserSettings>, ConfigError> {
        if !self.settings_path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.settings_path)?;
        let settings: UserSettings =
            serde_json::from_str(&data).map_err(|err| ConfigError::Serde(err.to_string()))?;
        settings.business_day()?;
        Ok(Some(settings))
    }

    pub fn load(&self) -> Result<UserSettings, ConfigError> {
        Ok(self
            .load_existing()?
            .unwrap_or_else(|| UserSettings::new(Utc::now())))
    }

    /// Writes through a sibling temp file so readers never see a partial file.
    pub fn save(&self, settings: &UserSettings) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|err| ConfigError::Serde(err.to_string()))?;
        let tmp = self.settings_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.settings_path)?;
        Ok(())
    }

    /// Loads, patches, and writes back the settings in one call.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<UserSettings, ConfigError> {
        let mut settings = self.load()?;
        settings.apply(patch, Utc::now())?;
        self.save(&settings)?;
        Ok(settings)
    }
}

impl SettingsStore for SettingsManager {
    fn get(&self) -> Result<Option<UserSettings>, CoreError> {
        Ok(self.load_existing()?)
    }

    fn save(&self, patch: &SettingsPatch) -> Result<UserSettings, CoreError> {
        Ok(self.apply(patch)?)
    }
}
