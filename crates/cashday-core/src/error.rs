use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::conflict_service::ConflictAction;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unrecognized action: {0}")]
    UnrecognizedAction(String),
    #[error("No closed closure exists for {0}")]
    NoClosedClosure(NaiveDate),
    #[error("Closure not found: {0}")]
    ClosureNotFound(String),
    #[error("Stale write for closure {id}: expected version {expected}, found {found}")]
    StaleWrite { id: String, expected: u64, found: u64 },
    #[error("{action} stopped at the {step} step: {source}")]
    Reconcile {
        action: ConflictAction,
        step: ReconcileStep,
        source: Box<CoreError>,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for failures raised by the persistence layer, which callers may retry.
    pub fn is_persistence(&self) -> bool {
        match self {
            CoreError::Storage(_)
            | CoreError::Serde(_)
            | CoreError::Io(_)
            | CoreError::StaleWrite { .. }
            | CoreError::ClosureNotFound(_) => true,
            CoreError::Reconcile { source, .. } => source.is_persistence(),
            _ => false,
        }
    }

    /// The reconciliation step that failed, if any.
    pub fn failed_step(&self) -> Option<ReconcileStep> {
        match self {
            CoreError::Reconcile { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Individually committed store operation within a reconciliation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    Delete,
    NextNumber,
    Save,
    Close,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileStep::Delete => "delete",
            ReconcileStep::NextNumber => "next-number",
            ReconcileStep::Save => "save",
            ReconcileStep::Close => "close",
        };
        f.write_str(label)
    }
}
