//! Timer-driven entry points: business-day rollover detection and debounced
//! autosave. Both stop when cancelled or dropped.

pub mod autosave;
pub mod rollover;

pub use autosave::{AutosaveDebouncer, AutosaveSink, DEFAULT_AUTOSAVE_DELAY};
pub use rollover::{BusinessDayChanged, RolloverWatcher, DEFAULT_ROLLOVER_PERIOD};
