//! Calendar-date helpers shared by the statistics and streak logic.
//!
//! Calendar dates cross the store boundary as `YYYY-MM-DD` strings; instants
//! are Unix-second timestamps. Everything here works in whole calendar days.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime};

use crate::error::{Error, Result};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Returns today's date in UTC.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parses a `YYYY-MM-DD` string into a date.
///
/// # Errors
/// Returns a validation error if the string is not a valid calendar date.
pub fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value, DATE_FORMAT)
        .map_err(|err| Error::Validation(format!("invalid date {value:?}: {err}")))
}

/// Returns the Monday that starts the week containing `date`.
pub fn week_start(date: Date) -> Date {
    let days_from_monday = i64::from(date.weekday().number_days_from_monday());
    date - Duration::days(days_from_monday)
}

/// Returns `date` shifted by `days` calendar days (negative shifts backward).
pub fn add_days(date: Date, days: i64) -> Date {
    date + Duration::days(days)
}

/// Returns the number of days in a calendar month.
pub fn month_length(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if time::util::is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}
