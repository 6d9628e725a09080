use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Clock abstracts access to the current time so services remain deterministic in tests.
pub trait Clock: Send + Sync {
    /// Returns the current UTC timestamp, used for `createdAt`/`closedAt`.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the host-local wall-clock time business days are computed from.
    fn local_now(&self) -> NaiveDateTime;

    /// Returns the current local calendar date. Defaults to `local_now().date()`.
    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

/// Clock whose time only moves when told to. Local time is treated as UTC.
#[derive(Debug)]
pub struct ManualClock {
    local: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(local: NaiveDateTime) -> Self {
        Self {
            local: Mutex::new(local),
        }
    }

    pub fn set(&self, local: NaiveDateTime) {
        *self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = local;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.local_now())
    }

    fn local_now(&self) -> NaiveDateTime {
        *self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
