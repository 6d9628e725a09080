//! Shared traits and identifier helpers for closure primitives.

use chrono::NaiveDate;

/// Calendar format used for business-day strings at rest and in ids.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Supplies a common contract for retrieving numeric amounts.
pub trait Amounted {
    fn amount(&self) -> f64;
}

/// Sums the amounts of every item in `items`.
pub fn sum_amounts<'a, T, I>(items: I) -> f64
where
    T: Amounted + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items.into_iter().map(|item| item.amount()).sum()
}

/// Formats a business day as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Builds the deterministic key of a closure record.
///
/// The primary closure of a day is `{user}_{date}`; additional closures for the
/// same day carry their sequence number as a suffix.
pub fn closure_id(user_id: &str, date: NaiveDate, closure_number: Option<u32>) -> String {
    match closure_number {
        Some(number) => format!("{}_{}_{}", user_id, format_date(date), number),
        None => format!("{}_{}", user_id, format_date(date)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_and_numbered_ids() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(closure_id("u1", date, None), "u1_2024-06-01");
        assert_eq!(closure_id("u1", date, Some(2)), "u1_2024-06-01_2");
    }
}
