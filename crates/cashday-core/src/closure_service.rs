//! Closure aggregation and draft validation.

use chrono::{DateTime, Utc};

use cashday_domain::{
    sum_amounts, ClosureDraft, ClosureTotals, DailyClosure, DailyExpense, WorkModeTransaction,
};

use crate::CoreError;

/// Derives every computed closure field from the entered amounts and the
/// registered transaction snapshot.
///
/// Pure and cheap enough to run on every keystroke. Only `collection`
/// transactions contribute to the work-mode total; with no registered
/// transactions the whole counted total shows up as difference.
pub fn aggregate(
    cash_counted: f64,
    card_counted: f64,
    transfer_counted: f64,
    expenses: &[DailyExpense],
    transactions: &[WorkModeTransaction],
) -> ClosureTotals {
    let total_counted = cash_counted + card_counted + transfer_counted;
    let total_expenses = sum_amounts(expenses);
    let work_mode_total = transactions
        .iter()
        .filter(|txn| txn.is_collection())
        .map(|txn| txn.amount)
        .sum::<f64>();
    ClosureTotals {
        total_counted,
        total_expenses,
        work_mode_total,
        difference: total_counted - work_mode_total,
        final_balance: total_counted - total_expenses,
    }
}

/// Provides validation and construction helpers for [`DailyClosure`] records.
pub struct ClosureService;

impl ClosureService {
    /// Totals for a draft against a transaction snapshot.
    pub fn preview(draft: &ClosureDraft, transactions: &[WorkModeTransaction]) -> ClosureTotals {
        aggregate(
            draft.cash_counted,
            draft.card_counted,
            draft.transfer_counted,
            &draft.expenses,
            transactions,
        )
    }

    /// Rejects negative or non-finite amounts and unnamed expenses.
    pub fn validate_draft(draft: &ClosureDraft) -> Result<(), CoreError> {
        Self::validate_amount("cash counted", draft.cash_counted)?;
        Self::validate_amount("card counted", draft.card_counted)?;
        Self::validate_amount("transfer counted", draft.transfer_counted)?;
        for expense in &draft.expenses {
            if expense.description.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "expense {} needs a description",
                    expense.id
                )));
            }
            Self::validate_amount("expense amount", expense.amount)?;
        }
        Ok(())
    }

    /// Builds an open closure from a validated draft.
    pub fn build_closure(
        id: impl Into<String>,
        draft: &ClosureDraft,
        transactions: &[WorkModeTransaction],
        created_at: DateTime<Utc>,
    ) -> DailyClosure {
        let totals = Self::preview(draft, transactions);
        let ids = transactions.iter().map(|txn| txn.id.clone()).collect();
        DailyClosure::from_draft(id, draft, totals, ids, created_at)
    }

    /// Recomputes the derived fields of `closure` from its own inputs, keeping
    /// its recorded work-mode total.
    pub fn refresh_totals(closure: &mut DailyClosure) {
        let mut totals = aggregate(
            closure.cash_counted,
            closure.card_counted,
            closure.transfer_counted,
            &closure.expenses,
            &[],
        );
        totals.work_mode_total = closure.work_mode_total;
        totals.difference = totals.total_counted - closure.work_mode_total;
        closure.apply_totals(totals);
    }

    fn validate_amount(label: &str, value: f64) -> Result<(), CoreError> {
        if !value.is_finite() {
            return Err(CoreError::Validation(format!("{label} must be a number")));
        }
        if value < 0.0 {
            return Err(CoreError::Validation(format!(
                "{label} cannot be negative ({value})"
            )));
        }
        Ok(())
    }
}
