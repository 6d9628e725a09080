use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};

use cashday_domain::{DailyClosure, SettingsPatch, UserSettings, WorkModeTransaction};

use crate::CoreError;

/// Callback receiving the full closure list whenever it changes.
pub type ClosureListener = Arc<dyn Fn(&[DailyClosure]) + Send + Sync>;

/// Abstraction over persistence backends holding one user's closures.
///
/// Every method is an independently committed operation; callers chaining
/// several of them get no rollback when a later call fails.
pub trait ClosureStore: Send + Sync {
    /// Returns the primary (`{user}_{date}`) closure of a business day.
    fn get_closure_by_date(&self, date: NaiveDate) -> Result<Option<DailyClosure>, CoreError>;
    /// Upserts by id and returns the id.
    fn save_closure(&self, closure: &DailyClosure) -> Result<String, CoreError>;
    /// Marks a stored closure as closed at `closed_at`.
    fn close_closure(&self, id: &str, closed_at: DateTime<Utc>) -> Result<(), CoreError>;
    /// Deletes the primary closure of a business day.
    fn delete_closure(&self, date: NaiveDate) -> Result<(), CoreError>;
    /// Next unused sequence number for an additional closure on `date`.
    fn get_next_closure_number(&self, date: NaiveDate) -> Result<u32, CoreError>;
    /// Snapshot of externally registered transactions for `date`.
    fn get_transactions_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<WorkModeTransaction>, CoreError>;
    fn list_closures(&self) -> Result<Vec<DailyClosure>, CoreError>;
    /// Registers a listener that is called immediately and after every change.
    fn subscribe_to_closures(&self, listener: ClosureListener) -> Result<Subscription, CoreError>;
}

/// Abstraction over the per-user settings document.
pub trait SettingsStore: Send + Sync {
    fn get(&self) -> Result<Option<UserSettings>, CoreError>;
    /// Applies a partial update and returns the stored result.
    fn save(&self, patch: &SettingsPatch) -> Result<UserSettings, CoreError>;
}

/// Handle to a live listener. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
