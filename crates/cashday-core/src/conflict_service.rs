//! Reconciliation of a new closure attempt with an already closed closure for
//! the same business day.
//!
//! A conflict exists only when the day's primary closure is `closed`; an
//! `open` record is simply overwritten by autosave/finalize. Once a conflict is
//! found, one of four [`ConflictAction`]s is applied. Actions that touch the
//! store run their steps in a fixed order and stop at the first failure,
//! leaving whatever was already committed in place.

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cashday_domain::{
    closure_id, ClosureConflictBehavior, DailyClosure, UserSettings, WorkModeTransaction,
};

use crate::{
    closure_service::ClosureService, error::ReconcileStep, storage::ClosureStore, CoreError,
};

const NOTE_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Merge both closures into one.
    Unify,
    /// Keep the existing closure and store the attempt as an extra numbered one.
    Multiple,
    /// Drop the existing closure in favour of the attempt.
    Replace,
    /// Reopen the existing closure and discard the attempt.
    Edit,
}

impl ConflictAction {
    pub const ALL: [ConflictAction; 4] = [
        ConflictAction::Unify,
        ConflictAction::Multiple,
        ConflictAction::Replace,
        ConflictAction::Edit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictAction::Unify => "unify",
            ConflictAction::Multiple => "multiple",
            ConflictAction::Replace => "replace",
            ConflictAction::Edit => "edit",
        }
    }
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictAction {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ConflictAction::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| CoreError::UnrecognizedAction(value.to_string()))
    }
}

/// Suggests an action from how long ago the existing closure was closed.
///
/// Closures made within `threshold` of each other are most likely the same
/// session entered twice; further apart they are probably separate shifts.
/// Without a close timestamp there is nothing to reason about, so the attempt
/// replaces the existing record.
pub fn recommend(
    closed_at: Option<DateTime<Utc>>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> ConflictAction {
    match closed_at {
        None => ConflictAction::Replace,
        Some(closed_at) if now - closed_at < threshold => ConflictAction::Unify,
        Some(_) => ConflictAction::Multiple,
    }
}

/// Outcome of applying the user's conflict preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Preference is an `always_*` value; apply without prompting.
    Apply(ConflictAction),
    /// Preference is `ask`; present `recommended` as the default choice.
    Ask { recommended: ConflictAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub behavior: ClosureConflictBehavior,
    pub threshold: Duration,
}

impl ConflictPolicy {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            behavior: settings.closure_conflict_behavior,
            threshold: settings.unified_threshold(),
        }
    }

    pub fn recommendation(&self, existing: &DailyClosure, now: DateTime<Utc>) -> ConflictAction {
        recommend(existing.closed_at, self.threshold, now)
    }

    pub fn decide(&self, existing: &DailyClosure, now: DateTime<Utc>) -> ConflictDecision {
        match self.behavior {
            ClosureConflictBehavior::Ask => ConflictDecision::Ask {
                recommended: self.recommendation(existing, now),
            },
            ClosureConflictBehavior::AlwaysUnify => ConflictDecision::Apply(ConflictAction::Unify),
            ClosureConflictBehavior::AlwaysMultiple => {
                ConflictDecision::Apply(ConflictAction::Multiple)
            }
            ClosureConflictBehavior::AlwaysReplace => {
                ConflictDecision::Apply(ConflictAction::Replace)
            }
        }
    }
}

/// A closure the user is trying to finalize together with the transaction
/// snapshot it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureAttempt {
    pub closure: DailyClosure,
    pub transactions: Vec<WorkModeTransaction>,
}

impl ClosureAttempt {
    pub fn new(closure: DailyClosure, transactions: Vec<WorkModeTransaction>) -> Self {
        Self {
            closure,
            transactions,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.closure.date
    }
}

/// Finds the closed primary closure for `date`, if any.
///
/// Looks in `cache` first; only when the cache holds no record for the day
/// does it read the store. An open record is never a conflict.
pub fn find_closed_closure(
    store: &dyn ClosureStore,
    cache: &[DailyClosure],
    date: NaiveDate,
) -> Result<Option<DailyClosure>, CoreError> {
    if let Some(cached) = cache.iter().find(|c| c.date == date && c.is_primary()) {
        debug!(%date, status = %cached.status, "conflict lookup served from cache");
        return Ok(cached.is_closed().then(|| cached.clone()));
    }
    debug!(%date, "conflict lookup missed cache, reading store");
    Ok(store
        .get_closure_by_date(date)?
        .filter(|closure| closure.is_closed()))
}

/// Merges `attempt` into `existing`.
///
/// Counted amounts add up pairwise, expenses and notes are concatenated, and
/// the registered transaction snapshots are unioned so a transaction seen by
/// both closures is only counted once.
pub fn unify_closures(existing: &DailyClosure, attempt: &ClosureAttempt) -> DailyClosure {
    let incoming = &attempt.closure;
    let mut unified = existing.clone();
    unified.cash_counted = existing.cash_counted + incoming.cash_counted;
    unified.card_counted = existing.card_counted + incoming.card_counted;
    unified.transfer_counted = existing.transfer_counted + incoming.transfer_counted;
    unified.expenses = existing
        .expenses
        .iter()
        .chain(incoming.expenses.iter())
        .cloned()
        .collect();
    unified.note = join_notes(existing.note.as_deref(), incoming.note.as_deref());

    let mut seen: HashSet<&str> = existing
        .work_mode_transaction_ids
        .iter()
        .map(String::as_str)
        .collect();
    let mut ids = existing.work_mode_transaction_ids.clone();
    let mut work_mode_total = existing.work_mode_total;
    for txn in &attempt.transactions {
        if seen.insert(txn.id.as_str()) {
            ids.push(txn.id.clone());
            if txn.is_collection() {
                work_mode_total += txn.amount;
            }
        }
    }
    for id in &incoming.work_mode_transaction_ids {
        if seen.insert(id.as_str()) {
            ids.push(id.clone());
        }
    }
    unified.work_mode_transaction_ids = ids;
    unified.work_mode_total = work_mode_total;

    ClosureService::refresh_totals(&mut unified);
    unified.reopen();
    unified.version = 0;
    unified
}

fn join_notes(first: Option<&str>, second: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [first, second]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|note| !note.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(NOTE_SEPARATOR))
    }
}

/// What a reconciliation left in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The single closed closure holding both sets of figures.
    Unified(DailyClosure),
    /// The newly stored numbered closure; the existing one is untouched.
    Multiple(DailyClosure),
    /// The closed closure holding only the attempt's figures.
    Replaced(DailyClosure),
    /// The original closure, now open for editing.
    Reopened(DailyClosure),
}

impl Resolution {
    pub fn action(&self) -> ConflictAction {
        match self {
            Resolution::Unified(_) => ConflictAction::Unify,
            Resolution::Multiple(_) => ConflictAction::Multiple,
            Resolution::Replaced(_) => ConflictAction::Replace,
            Resolution::Reopened(_) => ConflictAction::Edit,
        }
    }

    pub fn closure(&self) -> &DailyClosure {
        match self {
            Resolution::Unified(closure)
            | Resolution::Multiple(closure)
            | Resolution::Replaced(closure)
            | Resolution::Reopened(closure) => closure,
        }
    }

    pub fn into_closure(self) -> DailyClosure {
        match self {
            Resolution::Unified(closure)
            | Resolution::Multiple(closure)
            | Resolution::Replaced(closure)
            | Resolution::Reopened(closure) => closure,
        }
    }
}

/// Applies conflict actions against a [`ClosureStore`].
pub struct ConflictResolver<'a> {
    store: &'a dyn ClosureStore,
    user_id: &'a str,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a dyn ClosureStore, user_id: &'a str) -> Self {
        Self { store, user_id }
    }

    /// Applies `action` to the conflict between `existing` and `attempt`.
    ///
    /// Step order per action:
    /// - unify: delete existing, save merged, close merged
    /// - multiple: reserve number, save numbered, close numbered
    /// - replace: delete existing, save attempt, close attempt
    /// - edit: save existing as open
    ///
    /// A failing step aborts the rest and is reported as
    /// [`CoreError::Reconcile`]; earlier steps stay committed.
    pub fn resolve(
        &self,
        action: ConflictAction,
        existing: &DailyClosure,
        attempt: &ClosureAttempt,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CoreError> {
        Self::ensure_conflict(existing, attempt)?;
        info!(
            action = %action,
            date = %existing.date,
            existing = %existing.id,
            "resolving closure conflict"
        );
        match action {
            ConflictAction::Unify => self.unify(existing, attempt, now),
            ConflictAction::Multiple => self.multiple(attempt, now),
            ConflictAction::Replace => self.replace(existing, attempt, now),
            ConflictAction::Edit => self.edit(existing),
        }
    }

    fn ensure_conflict(existing: &DailyClosure, attempt: &ClosureAttempt) -> Result<(), CoreError> {
        if !existing.is_closed() {
            return Err(CoreError::NoClosedClosure(attempt.date()));
        }
        if existing.date != attempt.date() {
            return Err(CoreError::Validation(format!(
                "closure {} is for {}, attempt is for {}",
                existing.id,
                existing.date,
                attempt.date()
            )));
        }
        if !existing.is_primary() {
            return Err(CoreError::Validation(format!(
                "closure {} is not the primary closure of {}",
                existing.id, existing.date
            )));
        }
        Ok(())
    }

    fn unify(
        &self,
        existing: &DailyClosure,
        attempt: &ClosureAttempt,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CoreError> {
        let action = ConflictAction::Unify;
        let mut unified = unify_closures(existing, attempt);
        run_step(action, ReconcileStep::Delete, || {
            self.store.delete_closure(existing.date)
        })?;
        run_step(action, ReconcileStep::Save, || self.store.save_closure(&unified))?;
        run_step(action, ReconcileStep::Close, || {
            self.store.close_closure(&unified.id, now)
        })?;
        unified.mark_closed(now);
        Ok(Resolution::Unified(unified))
    }

    fn multiple(
        &self,
        attempt: &ClosureAttempt,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CoreError> {
        let action = ConflictAction::Multiple;
        let date = attempt.date();
        let number = run_step(action, ReconcileStep::NextNumber, || {
            self.store.get_next_closure_number(date)
        })?;
        let mut extra = attempt.closure.clone();
        extra.id = closure_id(self.user_id, date, Some(number));
        extra.closure_number = Some(number);
        extra.reopen();
        extra.version = 0;
        run_step(action, ReconcileStep::Save, || self.store.save_closure(&extra))?;
        run_step(action, ReconcileStep::Close, || {
            self.store.close_closure(&extra.id, now)
        })?;
        extra.mark_closed(now);
        Ok(Resolution::Multiple(extra))
    }

    fn replace(
        &self,
        existing: &DailyClosure,
        attempt: &ClosureAttempt,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CoreError> {
        let action = ConflictAction::Replace;
        run_step(action, ReconcileStep::Delete, || {
            self.store.delete_closure(existing.date)
        })?;
        let mut fresh = attempt.closure.clone();
        fresh.id = existing.id.clone();
        fresh.closure_number = None;
        fresh.reopen();
        fresh.version = 0;
        run_step(action, ReconcileStep::Save, || self.store.save_closure(&fresh))?;
        run_step(action, ReconcileStep::Close, || {
            self.store.close_closure(&fresh.id, now)
        })?;
        fresh.mark_closed(now);
        Ok(Resolution::Replaced(fresh))
    }

    fn edit(&self, existing: &DailyClosure) -> Result<Resolution, CoreError> {
        let mut reopened = existing.clone();
        reopened.reopen();
        run_step(ConflictAction::Edit, ReconcileStep::Save, || {
            self.store.save_closure(&reopened)
        })?;
        Ok(Resolution::Reopened(reopened))
    }
}

fn run_step<T>(
    action: ConflictAction,
    step: ReconcileStep,
    op: impl FnOnce() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    match op() {
        Ok(value) => {
            debug!(action = %action, step = %step, "reconcile step committed");
            Ok(value)
        }
        Err(err) => {
            warn!(action = %action, step = %step, error = %err, "reconcile step failed");
            Err(CoreError::Reconcile {
                action,
                step,
                source: Box::new(err),
            })
        }
    }
}
