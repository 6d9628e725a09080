//! Per-user closure preferences: business-day cutoff and conflict handling.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CUTOFF_HOUR: u8 = 4;
pub const DEFAULT_UNIFIED_CLOSURE_THRESHOLD_MS: u64 = 2 * 60 * 60 * 1000;

/// Hour of day before which overnight activity belongs to the previous
/// business day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBusinessDayConfig")]
pub struct BusinessDayConfig {
    cutoff_hour: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBusinessDayConfig {
    cutoff_hour: u8,
}

impl TryFrom<RawBusinessDayConfig> for BusinessDayConfig {
    type Error = InvalidCutoffHour;

    fn try_from(raw: RawBusinessDayConfig) -> Result<Self, Self::Error> {
        Self::new(raw.cutoff_hour)
    }
}

impl BusinessDayConfig {
    pub fn new(cutoff_hour: u8) -> Result<Self, InvalidCutoffHour> {
        if cutoff_hour > 23 {
            return Err(InvalidCutoffHour(cutoff_hour));
        }
        Ok(Self { cutoff_hour })
    }

    pub fn cutoff_hour(&self) -> u8 {
        self.cutoff_hour
    }
}

impl Default for BusinessDayConfig {
    fn default() -> Self {
        Self {
            cutoff_hour: DEFAULT_CUTOFF_HOUR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cutoff hour must be between 0 and 23, got {0}")]
pub struct InvalidCutoffHour(pub u8);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// What to do when a day that already has a closed closure is finalized again.
pub enum ClosureConflictBehavior {
    #[default]
    Ask,
    AlwaysUnify,
    AlwaysMultiple,
    AlwaysReplace,
}

impl fmt::Display for ClosureConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClosureConflictBehavior::Ask => "ask",
            ClosureConflictBehavior::AlwaysUnify => "always_unify",
            ClosureConflictBehavior::AlwaysMultiple => "always_multiple",
            ClosureConflictBehavior::AlwaysReplace => "always_replace",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default = "UserSettings::default_cutoff_hour")]
    pub business_day_cutoff_hour: u8,
    #[serde(default)]
    pub closure_conflict_behavior: ClosureConflictBehavior,
    /// Milliseconds within which a second closure counts as the same session.
    #[serde(default = "UserSettings::default_threshold_ms")]
    pub unified_closure_threshold: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            business_day_cutoff_hour: DEFAULT_CUTOFF_HOUR,
            closure_conflict_behavior: ClosureConflictBehavior::Ask,
            unified_closure_threshold: DEFAULT_UNIFIED_CLOSURE_THRESHOLD_MS,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn default_cutoff_hour() -> u8 {
        DEFAULT_CUTOFF_HOUR
    }

    pub fn default_threshold_ms() -> u64 {
        DEFAULT_UNIFIED_CLOSURE_THRESHOLD_MS
    }

    /// Validated business-day configuration for the stored cutoff hour.
    pub fn business_day(&self) -> Result<BusinessDayConfig, InvalidCutoffHour> {
        BusinessDayConfig::new(self.business_day_cutoff_hour)
    }

    pub fn unified_threshold(&self) -> Duration {
        Duration::milliseconds(self.unified_closure_threshold.min(i64::MAX as u64) as i64)
    }

    /// Applies a partial update, validating it before touching any field.
    pub fn apply(
        &mut self,
        patch: &SettingsPatch,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidCutoffHour> {
        if let Some(hour) = patch.business_day_cutoff_hour {
            BusinessDayConfig::new(hour)?;
            self.business_day_cutoff_hour = hour;
        }
        if let Some(behavior) = patch.closure_conflict_behavior {
            self.closure_conflict_behavior = behavior;
        }
        if let Some(threshold) = patch.unified_closure_threshold {
            self.unified_closure_threshold = threshold;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Partial settings update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_day_cutoff_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_conflict_behavior: Option<ClosureConflictBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_closure_threshold: Option<u64>,
}

impl SettingsPatch {
    pub fn cutoff_hour(hour: u8) -> Self {
        Self {
            business_day_cutoff_hour: Some(hour),
            ..Self::default()
        }
    }

    pub fn conflict_behavior(behavior: ClosureConflictBehavior) -> Self {
        Self {
            closure_conflict_behavior: Some(behavior),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.business_day_cutoff_hour.is_none()
            && self.closure_conflict_behavior.is_none()
            && self.unified_closure_threshold.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_hour_is_bounded() {
        assert_eq!(BusinessDayConfig::new(23).unwrap().cutoff_hour(), 23);
        assert_eq!(BusinessDayConfig::new(24), Err(InvalidCutoffHour(24)));
        assert_eq!(BusinessDayConfig::default().cutoff_hour(), 4);
    }

    #[test]
    fn config_deserialization_validates_hour() {
        let ok: BusinessDayConfig = serde_json::from_str(r#"{"cutoffHour":5}"#).unwrap();
        assert_eq!(ok.cutoff_hour(), 5);
        assert!(serde_json::from_str::<BusinessDayConfig>(r#"{"cutoffHour":30}"#).is_err());
    }

    #[test]
    fn behavior_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&ClosureConflictBehavior::AlwaysUnify).unwrap();
        assert_eq!(json, "\"always_unify\"");
    }

    #[test]
    fn invalid_patch_leaves_settings_untouched() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut settings = UserSettings::new(created);
        let patch = SettingsPatch {
            business_day_cutoff_hour: Some(40),
            closure_conflict_behavior: Some(ClosureConflictBehavior::AlwaysReplace),
            unified_closure_threshold: None,
        };
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(settings.apply(&patch, later).is_err());
        assert_eq!(settings.closure_conflict_behavior, ClosureConflictBehavior::Ask);
        assert_eq!(settings.updated_at, created);
    }

    #[test]
    fn out_of_range_stored_hour_is_reported() {
        let json = r#"{"businessDayCutoffHour":30,"createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}"#;
        let settings: UserSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.business_day(), Err(InvalidCutoffHour(30)));
        assert_eq!(
            UserSettings::new(Utc::now()).business_day().unwrap().cutoff_hour(),
            DEFAULT_CUTOFF_HOUR
        );
    }

    #[test]
    fn default_threshold_is_two_hours() {
        let settings = UserSettings::new(Utc::now());
        assert_eq!(settings.unified_threshold(), Duration::hours(2));
    }
}
