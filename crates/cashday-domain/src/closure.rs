//! Domain models for daily closures, their expenses, and in-progress drafts.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{sum_amounts, Amounted};

const AMOUNT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyExpense {
    pub id: String,
    pub description: String,
    pub amount: f64,
}

impl DailyExpense {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            amount,
        }
    }
}

impl Amounted for DailyExpense {
    fn amount(&self) -> f64 {
        self.amount
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
/// Enumerates the lifecycle state of a closure.
pub enum ClosureStatus {
    #[default]
    Open,
    Closed,
}

impl fmt::Display for ClosureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClosureStatus::Open => "open",
            ClosureStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Computed figures of a closure, derived from counted amounts, expenses and
/// the registered transaction snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureTotals {
    pub total_counted: f64,
    pub total_expenses: f64,
    pub work_mode_total: f64,
    pub difference: f64,
    pub final_balance: f64,
}

/// The user's in-progress inputs for a business day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosureDraft {
    pub date: NaiveDate,
    #[serde(default)]
    pub cash_counted: f64,
    #[serde(default)]
    pub card_counted: f64,
    #[serde(default)]
    pub transfer_counted: f64,
    #[serde(default)]
    pub expenses: Vec<DailyExpense>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ClosureDraft {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            cash_counted: 0.0,
            card_counted: 0.0,
            transfer_counted: 0.0,
            expenses: Vec::new(),
            note: None,
        }
    }

    pub fn with_counts(mut self, cash: f64, card: f64, transfer: f64) -> Self {
        self.cash_counted = cash;
        self.card_counted = card;
        self.transfer_counted = transfer;
        self
    }

    pub fn with_expense(mut self, description: impl Into<String>, amount: f64) -> Self {
        self.expenses.push(DailyExpense::new(description, amount));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Returns true once the user has entered any amount or expense.
    pub fn has_input(&self) -> bool {
        self.cash_counted != 0.0
            || self.card_counted != 0.0
            || self.transfer_counted != 0.0
            || !self.expenses.is_empty()
    }

    /// Returns the note when it contains more than whitespace.
    pub fn note_text(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyClosure {
    pub id: String,
    pub date: NaiveDate,
    pub cash_counted: f64,
    pub card_counted: f64,
    pub transfer_counted: f64,
    pub total_counted: f64,
    pub expenses: Vec<DailyExpense>,
    pub total_expenses: f64,
    pub work_mode_transaction_ids: Vec<String>,
    pub work_mode_total: f64,
    pub difference: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub final_balance: f64,
    pub status: ClosureStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_number: Option<u32>,
    #[serde(default)]
    pub version: u64,
}

impl DailyClosure {
    /// Creates an open closure from a draft and precomputed totals.
    pub fn from_draft(
        id: impl Into<String>,
        draft: &ClosureDraft,
        totals: ClosureTotals,
        work_mode_transaction_ids: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            date: draft.date,
            cash_counted: draft.cash_counted,
            card_counted: draft.card_counted,
            transfer_counted: draft.transfer_counted,
            total_counted: totals.total_counted,
            expenses: draft.expenses.clone(),
            total_expenses: totals.total_expenses,
            work_mode_transaction_ids,
            work_mode_total: totals.work_mode_total,
            difference: totals.difference,
            note: draft.note_text().map(str::to_string),
            final_balance: totals.final_balance,
            status: ClosureStatus::Open,
            created_at,
            closed_at: None,
            closure_number: None,
            version: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == ClosureStatus::Closed
    }

    /// True for the `{user}_{date}` record of a day, false for numbered extras.
    pub fn is_primary(&self) -> bool {
        self.closure_number.is_none()
    }

    pub fn totals(&self) -> ClosureTotals {
        ClosureTotals {
            total_counted: self.total_counted,
            total_expenses: self.total_expenses,
            work_mode_total: self.work_mode_total,
            difference: self.difference,
            final_balance: self.final_balance,
        }
    }

    pub fn apply_totals(&mut self, totals: ClosureTotals) {
        self.total_counted = totals.total_counted;
        self.total_expenses = totals.total_expenses;
        self.work_mode_total = totals.work_mode_total;
        self.difference = totals.difference;
        self.final_balance = totals.final_balance;
    }

    pub fn mark_closed(&mut self, closed_at: DateTime<Utc>) {
        self.status = ClosureStatus::Closed;
        self.closed_at = Some(closed_at);
    }

    pub fn reopen(&mut self) {
        self.status = ClosureStatus::Open;
        self.closed_at = None;
    }

    /// Reports every computed field that disagrees with its source fields.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let counted = self.cash_counted + self.card_counted + self.transfer_counted;
        if !approx_eq(self.total_counted, counted) {
            problems.push(format!(
                "closure {} totalCounted {} != {}",
                self.id, self.total_counted, counted
            ));
        }
        let expenses = sum_amounts(&self.expenses);
        if !approx_eq(self.total_expenses, expenses) {
            problems.push(format!(
                "closure {} totalExpenses {} != {}",
                self.id, self.total_expenses, expenses
            ));
        }
        if !approx_eq(self.final_balance, self.total_counted - self.total_expenses) {
            problems.push(format!(
                "closure {} finalBalance {} inconsistent",
                self.id, self.final_balance
            ));
        }
        if !approx_eq(self.difference, self.total_counted - self.work_mode_total) {
            problems.push(format!(
                "closure {} difference {} inconsistent",
                self.id, self.difference
            ));
        }
        if self.is_closed() && self.closed_at.is_none() {
            problems.push(format!("closure {} closed without closedAt", self.id));
        }
        problems
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < AMOUNT_EPSILON
}
