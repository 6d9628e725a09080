//! Business-day resolution.
//!
//! Maps wall-clock time to the business day a closure belongs to. Normal
//! operating hours (06:00 through 22:59) always map to the calendar date; the
//! configured cutoff hour only matters overnight, where the early-morning tail
//! still belongs to the previous day.
//!
//! Every function is pure and evaluated against an explicit local time. Dates
//! are host-local calendar dates; no timezone conversion is performed.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use cashday_domain::BusinessDayConfig;

use crate::time::Clock;

/// First hour of the normal operating window.
pub const DAY_START_HOUR: u32 = 6;
/// Last hour (inclusive) of the normal operating window.
pub const DAY_END_HOUR: u32 = 22;
/// Hours before noon count as "after midnight" for prompting purposes.
pub const NOON_HOUR: u32 = 12;

fn in_operating_hours(hour: u32) -> bool {
    (DAY_START_HOUR..=DAY_END_HOUR).contains(&hour)
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    date - Duration::days(1)
}

/// Returns the business day that `now` belongs to.
pub fn business_day(config: BusinessDayConfig, now: NaiveDateTime) -> NaiveDate {
    let today = now.date();
    let hour = now.hour();
    if in_operating_hours(hour) {
        return today;
    }
    if hour < u32::from(config.cutoff_hour()) {
        previous_day(today)
    } else {
        today
    }
}

/// True while the calendar has advanced but the business day is still yesterday.
pub fn is_extended_hours(config: BusinessDayConfig, now: NaiveDateTime) -> bool {
    now.hour() < u32::from(config.cutoff_hour())
}

pub fn is_after_midnight(now: NaiveDateTime) -> bool {
    now.hour() < NOON_HOUR
}

/// Which day to offer for closing, and whether the user should be asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureDateSuggestions {
    pub suggested_date: NaiveDate,
    pub alternate_date: Option<NaiveDate>,
    pub is_after_midnight: bool,
    pub business_day: NaiveDate,
    pub calendar_day: NaiveDate,
    pub message: String,
}

impl ClosureDateSuggestions {
    pub fn is_ambiguous(&self) -> bool {
        self.alternate_date.is_some()
    }
}

pub fn closure_date_suggestions(
    config: BusinessDayConfig,
    now: NaiveDateTime,
) -> ClosureDateSuggestions {
    let today = now.date();
    let yesterday = previous_day(today);
    let hour = now.hour();
    let after_midnight = is_after_midnight(now);
    let business = business_day(config, now);

    let (suggested_date, alternate_date, message) =
        if in_operating_hours(hour) || !after_midnight {
            (today, None, format!("Closing the business day of {today}."))
        } else if hour < u32::from(config.cutoff_hour()) {
            (
                yesterday,
                Some(today),
                format!(
                    "It is past midnight. Which day do you want to close? \
                     Business day {yesterday} is still running until {:02}:00.",
                    config.cutoff_hour()
                ),
            )
        } else {
            (
                today,
                Some(yesterday),
                format!(
                    "It is past the {:02}:00 cutoff. Which day do you want to close? \
                     You may still close {yesterday}.",
                    config.cutoff_hour()
                ),
            )
        };

    ClosureDateSuggestions {
        suggested_date,
        alternate_date,
        is_after_midnight: after_midnight,
        business_day: business,
        calendar_day: today,
        message,
    }
}

/// Caller-owned pairing of the business-day configuration with a time source.
#[derive(Clone, Copy)]
pub struct BusinessDayContext<'a> {
    pub config: BusinessDayConfig,
    pub clock: &'a dyn Clock,
}

impl<'a> BusinessDayContext<'a> {
    pub fn new(config: BusinessDayConfig, clock: &'a dyn Clock) -> Self {
        Self { config, clock }
    }

    pub fn business_day(&self) -> NaiveDate {
        business_day(self.config, self.clock.local_now())
    }

    pub fn is_extended_hours(&self) -> bool {
        is_extended_hours(self.config, self.clock.local_now())
    }

    pub fn is_after_midnight(&self) -> bool {
        is_after_midnight(self.clock.local_now())
    }

    pub fn closure_date_suggestions(&self) -> ClosureDateSuggestions {
        closure_date_suggestions(self.config, self.clock.local_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn cutoff(hour: u8) -> BusinessDayConfig {
        BusinessDayConfig::new(hour).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
    }

    fn yesterday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn operating_hours_always_map_to_today() {
        for h in 0..24u8 {
            for hour in DAY_START_HOUR..=DAY_END_HOUR {
                assert_eq!(business_day(cutoff(h), at(hour, 30)), today(), "h={h} hour={hour}");
            }
        }
    }

    #[test]
    fn overnight_before_cutoff_maps_to_yesterday() {
        for h in 0..24u8 {
            for hour in 0..DAY_START_HOUR.min(u32::from(h)) {
                assert_eq!(business_day(cutoff(h), at(hour, 0)), yesterday(), "h={h} hour={hour}");
            }
        }
    }

    #[test]
    fn late_night_after_cutoff_is_today() {
        assert_eq!(business_day(cutoff(4), at(23, 15)), today());
        assert_eq!(business_day(cutoff(4), at(5, 0)), today());
    }

    #[test]
    fn half_past_two_with_cutoff_four_is_extended() {
        let now = at(2, 30);
        assert_eq!(business_day(cutoff(4), now), yesterday());
        assert!(is_extended_hours(cutoff(4), now));
        assert!(!is_extended_hours(cutoff(4), at(4, 0)));
    }

    #[test]
    fn after_midnight_means_before_noon() {
        assert!(is_after_midnight(at(0, 0)));
        assert!(is_after_midnight(at(11, 59)));
        assert!(!is_after_midnight(at(12, 0)));
    }

    #[test]
    fn suggestions_are_unambiguous_in_operating_hours() {
        for hour in DAY_START_HOUR..=DAY_END_HOUR {
            let suggestion = closure_date_suggestions(cutoff(4), at(hour, 0));
            assert_eq!(suggestion.suggested_date, today());
            assert!(suggestion.alternate_date.is_none());
        }
        let late = closure_date_suggestions(cutoff(4), at(23, 0));
        assert!(late.alternate_date.is_none());
        assert!(!late.is_after_midnight);
    }

    #[test]
    fn suggestions_before_cutoff_prefer_yesterday() {
        let suggestion = closure_date_suggestions(cutoff(4), at(1, 0));
        assert_eq!(suggestion.suggested_date, yesterday());
        assert_eq!(suggestion.alternate_date, Some(today()));
        assert_eq!(suggestion.business_day, yesterday());
        assert_eq!(suggestion.calendar_day, today());
        assert!(suggestion.message.contains("Which day"));
    }

    #[test]
    fn suggestions_between_cutoff_and_six_prefer_today() {
        let suggestion = closure_date_suggestions(cutoff(4), at(5, 10));
        assert_eq!(suggestion.suggested_date, today());
        assert_eq!(suggestion.alternate_date, Some(yesterday()));
        assert!(suggestion.is_ambiguous());
    }

    #[test]
    fn early_morning_always_offers_an_alternate() {
        for h in 0..24u8 {
            for hour in 0..DAY_START_HOUR {
                let suggestion = closure_date_suggestions(cutoff(h), at(hour, 0));
                assert!(suggestion.alternate_date.is_some(), "h={h} hour={hour}");
            }
        }
    }

    #[test]
    fn context_reads_from_clock() {
        let clock = ManualClock::new(at(2, 30));
        let ctx = BusinessDayContext::new(cutoff(4), &clock);
        assert_eq!(ctx.business_day(), yesterday());
        assert!(ctx.is_extended_hours());
        clock.set(at(9, 0));
        assert_eq!(ctx.business_day(), today());
        assert!(!ctx.closure_date_suggestions().is_ambiguous());
    }
}
