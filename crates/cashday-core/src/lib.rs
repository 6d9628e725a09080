//! cashday-core
//!
//! Business-day resolution, closure aggregation, and closure conflict reconciliation.
//! Depends on cashday-domain. No terminal I/O, no direct storage interactions;
//! persistence is reached only through the traits in [`storage`].

pub mod business_day;
pub mod closure_service;
pub mod conflict_service;
pub mod error;
pub mod storage;
pub mod time;

pub use business_day::*;
pub use closure_service::*;
pub use conflict_service::*;
pub use error::{CoreError, ReconcileStep};
pub use storage::{ClosureListener, ClosureStore, SettingsStore, Subscription};
pub use time::{Clock, ManualClock};
