#![doc(test(attr(deny(warnings))))]

//! Cashday tracks a small business's daily cash-register closures: the
//! business day a moment belongs to, the closure totals, and what happens when
//! a day that is already closed gets finalized again.

pub mod clock;
pub mod errors;
pub mod session;
pub mod tasks;
pub mod utils;

pub use clock::SystemClock;
pub use errors::CashdayError;
pub use session::{AutosaveOutcome, ClosureSession, FinalizeOutcome, PendingConflict};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Cashday tracing initialized.");
    });
}
