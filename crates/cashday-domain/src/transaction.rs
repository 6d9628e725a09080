//! Externally registered ("work mode") transactions used as a cross-check
//! against counted totals.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Amounted;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
/// Direction of a registered transaction.
pub enum TransactionKind {
    Collection,
    Payment,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionKind::Collection => "collection",
            TransactionKind::Payment => "payment",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkModeTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
}

impl WorkModeTransaction {
    pub fn new(kind: TransactionKind, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            amount,
        }
    }

    pub fn collection(amount: f64) -> Self {
        Self::new(TransactionKind::Collection, amount)
    }

    pub fn payment(amount: f64) -> Self {
        Self::new(TransactionKind::Payment, amount)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_collection(&self) -> bool {
        self.kind == TransactionKind::Collection
    }
}

impl Amounted for WorkModeTransaction {
    fn amount(&self) -> f64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_type_field() {
        let txn = WorkModeTransaction::collection(12.5).with_id("t1");
        let json = serde_json::to_value(&txn).unwrap();
        assert_eq!(json["type"], "collection");
        assert_eq!(json["id"], "t1");
    }
}
