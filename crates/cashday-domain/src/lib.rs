//! cashday-domain
//!
//! Pure domain models (DailyClosure, DailyExpense, WorkModeTransaction, UserSettings).
//! No I/O, no storage. Only data types and core enums.

pub mod closure;
pub mod common;
pub mod settings;
pub mod transaction;

pub use closure::*;
pub use common::*;
pub use settings::*;
pub use transaction::*;
