use cashday_core::Clock;
use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Reads the host clock. Business days follow the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
