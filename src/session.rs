//! User-facing closure workflow: draft previews, autosave, finalize and
//! conflict resolution over a live cache of the user's closures.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use cashday_config::{ConfigError, SettingsManager};
use cashday_core::{
    closure_date_suggestions, find_closed_closure, BusinessDayContext, ClosureAttempt,
    ClosureDateSuggestions, ClosureService, ClosureStore, Clock, ConflictAction, ConflictDecision,
    ConflictPolicy, ConflictResolver, CoreError, Resolution, SettingsStore, Subscription,
};
use cashday_domain::{
    closure_id, BusinessDayConfig, ClosureConflictBehavior, ClosureDraft, ClosureTotals,
    DailyClosure, SettingsPatch, UserSettings, WorkModeTransaction,
};
use cashday_storage_json::JsonClosureStore;
use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{
    tasks::{AutosaveDebouncer, AutosaveSink, BusinessDayChanged, RolloverWatcher},
    CashdayError,
};

const DIFFERENCE_EPSILON: f64 = 1e-6;

/// Result of an autosave request.
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveOutcome {
    Saved(DailyClosure),
    /// The draft has no counted amount or expense yet.
    SkippedEmpty,
    /// The day is already closed; edits go through conflict resolution.
    SkippedClosed,
}

/// A finalize attempt that hit a closed closure and awaits the user's choice.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConflict {
    pub existing: DailyClosure,
    pub attempt: ClosureAttempt,
    pub recommended: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// No closed closure existed; the draft is now the day's closed closure.
    Closed(DailyClosure),
    /// A stored `always_*` preference resolved the conflict without asking.
    Resolved(Resolution),
    Conflict(PendingConflict),
}

/// One user's closure session.
pub struct ClosureSession {
    user_id: String,
    closures: Arc<dyn ClosureStore>,
    settings_store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    cache: Arc<RwLock<Vec<DailyClosure>>>,
    settings: RwLock<UserSettings>,
    /// Published to running rollover watchers on every settings change.
    cutoff: watch::Sender<BusinessDayConfig>,
    subscription: Mutex<Option<Subscription>>,
}

impl ClosureSession {
    /// Loads settings and subscribes to the user's closures.
    pub fn open(
        user_id: impl Into<String>,
        closures: Arc<dyn ClosureStore>,
        settings_store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CashdayError> {
        let user_id = user_id.into();
        let settings = settings_store
            .get()?
            .unwrap_or_else(|| UserSettings::new(clock.now()));
        let (cutoff, _) = watch::channel(settings.business_day().map_err(ConfigError::from)?);

        let cache = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&cache);
        let subscription = closures.subscribe_to_closures(Arc::new(move |all: &[DailyClosure]| {
            *sink.write().unwrap_or_else(PoisonError::into_inner) = all.to_vec();
        }))?;

        info!(user = %user_id, cutoff = settings.business_day_cutoff_hour, "closure session opened");
        Ok(Self {
            user_id,
            closures,
            settings_store,
            clock,
            cache,
            settings: RwLock::new(settings),
            cutoff,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Opens a session backed by the JSON store and settings file under `base`,
    /// or under the user's data directory when `base` is `None`.
    pub fn open_on_disk(
        base: Option<PathBuf>,
        user_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CashdayError> {
        let user_id = user_id.into();
        let base = base.unwrap_or_else(|| SettingsManager::default_base_dir(&user_id));
        let closures = JsonClosureStore::new(base.join("data"), user_id.clone())?;
        let settings = SettingsManager::with_base_dir(base)?;
        Self::open(user_id, Arc::new(closures), Arc::new(settings), clock)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn settings(&self) -> UserSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the subscribed closures.
    pub fn closures(&self) -> Vec<DailyClosure> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn business_day_config(&self) -> BusinessDayConfig {
        *self.cutoff.borrow()
    }

    pub fn business_day(&self) -> NaiveDate {
        BusinessDayContext::new(self.business_day_config(), self.clock.as_ref()).business_day()
    }

    pub fn closure_date_suggestions(&self) -> ClosureDateSuggestions {
        closure_date_suggestions(self.business_day_config(), self.clock.local_now())
    }

    /// Totals the draft would produce against the day's transaction snapshot.
    pub fn preview(&self, draft: &ClosureDraft) -> Result<ClosureTotals, CashdayError> {
        ClosureService::validate_draft(draft)?;
        let transactions = self.closures.get_transactions_for_date(draft.date)?;
        Ok(ClosureService::preview(draft, &transactions))
    }

    pub fn find_closed_closure(&self, date: NaiveDate) -> Result<Option<DailyClosure>, CashdayError> {
        Ok(find_closed_closure(
            self.closures.as_ref(),
            &self.closures(),
            date,
        )?)
    }

    /// Overwrites the open closure of the draft's day.
    pub fn autosave(&self, draft: &ClosureDraft) -> Result<AutosaveOutcome, CashdayError> {
        if !draft.has_input() {
            return Ok(AutosaveOutcome::SkippedEmpty);
        }
        ClosureService::validate_draft(draft)?;
        let current = self.primary_for(draft.date)?;
        if current.as_ref().is_some_and(DailyClosure::is_closed) {
            debug!(date = %draft.date, "autosave skipped for closed day");
            return Ok(AutosaveOutcome::SkippedClosed);
        }
        let transactions = self.closures.get_transactions_for_date(draft.date)?;
        let closure = self.draft_closure(draft, &transactions, current.as_ref());
        self.closures.save_closure(&closure)?;
        debug!(id = %closure.id, "autosaved closure");
        Ok(AutosaveOutcome::Saved(closure))
    }

    /// Closes the draft's day, or reports the conflict with an existing
    /// closed closure.
    ///
    /// When transactions were registered for the day, counted totals that
    /// differ from them need a note.
    pub fn finalize(&self, draft: &ClosureDraft) -> Result<FinalizeOutcome, CashdayError> {
        ClosureService::validate_draft(draft)?;
        let transactions = self.closures.get_transactions_for_date(draft.date)?;
        let totals = ClosureService::preview(draft, &transactions);
        let unexplained = !transactions.is_empty() && totals.difference.abs() > DIFFERENCE_EPSILON;
        if unexplained && draft.note_text().is_none() {
            return Err(CoreError::Validation(format!(
                "a note is required when the difference is {:.2}",
                totals.difference
            ))
            .into());
        }

        let now = self.clock.now();
        if let Some(existing) = self.find_closed_closure(draft.date)? {
            let attempt = ClosureAttempt::new(
                self.draft_closure(draft, &transactions, None),
                transactions,
            );
            let policy = ConflictPolicy::from_settings(&self.settings());
            return match policy.decide(&existing, now) {
                ConflictDecision::Apply(action) => {
                    info!(action = %action, date = %draft.date, "applying stored conflict preference");
                    let resolution = self.resolver().resolve(action, &existing, &attempt, now)?;
                    Ok(FinalizeOutcome::Resolved(resolution))
                }
                ConflictDecision::Ask { recommended } => {
                    info!(date = %draft.date, recommended = %recommended, "closure conflict needs a decision");
                    Ok(FinalizeOutcome::Conflict(PendingConflict {
                        existing,
                        attempt,
                        recommended,
                    }))
                }
            };
        }

        let current = self.primary_for(draft.date)?;
        let mut closure = self.draft_closure(draft, &transactions, current.as_ref());
        self.closures.save_closure(&closure)?;
        self.closures.close_closure(&closure.id, now)?;
        closure.mark_closed(now);
        info!(id = %closure.id, balance = closure.final_balance, "closure finalized");
        Ok(FinalizeOutcome::Closed(closure))
    }

    pub fn resolve_conflict(
        &self,
        pending: &PendingConflict,
        action: ConflictAction,
    ) -> Result<Resolution, CashdayError> {
        Ok(self
            .resolver()
            .resolve(action, &pending.existing, &pending.attempt, self.clock.now())?)
    }

    /// Like [`Self::resolve_conflict`] for an action name such as `"unify"`.
    pub fn resolve_conflict_named(
        &self,
        pending: &PendingConflict,
        action: &str,
    ) -> Result<Resolution, CashdayError> {
        let action: ConflictAction = action.parse()?;
        self.resolve_conflict(pending, action)
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<UserSettings, CashdayError> {
        let saved = self.settings_store.save(patch)?;
        let config = saved.business_day().map_err(ConfigError::from)?;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = saved.clone();
        self.cutoff.send_replace(config);
        info!(
            cutoff = saved.business_day_cutoff_hour,
            behavior = %saved.closure_conflict_behavior,
            "settings updated"
        );
        Ok(saved)
    }

    /// Sets the conflict preference back to asking.
    pub fn reset_conflict_behavior(&self) -> Result<UserSettings, CashdayError> {
        self.update_settings(&SettingsPatch::conflict_behavior(
            ClosureConflictBehavior::Ask,
        ))
    }

    /// Starts a rollover watcher that follows later cutoff changes.
    pub fn watch_rollover(
        &self,
        period: Duration,
    ) -> (RolloverWatcher, mpsc::Receiver<BusinessDayChanged>) {
        RolloverWatcher::spawn(Arc::clone(&self.clock), self.cutoff.subscribe(), period)
    }

    /// Starts a debounced autosave loop feeding this session.
    pub fn autosave_debouncer(self: &Arc<Self>, delay: Duration) -> AutosaveDebouncer {
        AutosaveDebouncer::spawn(Arc::clone(self), delay)
    }

    /// Drops the closure subscription; the cache stops updating.
    pub fn close(&self) {
        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            subscription.unsubscribe();
        }
    }

    fn resolver(&self) -> ConflictResolver<'_> {
        ConflictResolver::new(self.closures.as_ref(), &self.user_id)
    }

    fn primary_for(&self, date: NaiveDate) -> Result<Option<DailyClosure>, CashdayError> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|closure| closure.date == date && closure.is_primary())
            .cloned();
        match cached {
            Some(closure) => Ok(Some(closure)),
            None => Ok(self.closures.get_closure_by_date(date)?),
        }
    }

    /// Builds the primary closure for a draft, carrying over the identity of
    /// the open record it overwrites.
    fn draft_closure(
        &self,
        draft: &ClosureDraft,
        transactions: &[WorkModeTransaction],
        current: Option<&DailyClosure>,
    ) -> DailyClosure {
        let id = closure_id(&self.user_id, draft.date, None);
        let created_at = current.map_or_else(|| self.clock.now(), |open| open.created_at);
        let mut closure = ClosureService::build_closure(id, draft, transactions, created_at);
        if let Some(open) = current {
            closure.version = open.version;
        }
        closure
    }
}

impl AutosaveSink for ClosureSession {
    fn autosave(&self, draft: &ClosureDraft) -> Result<AutosaveOutcome, CashdayError> {
        ClosureSession::autosave(self, draft)
    }
}

impl Drop for ClosureSession {
    fn drop(&mut self) {
        self.close();
    }
}
