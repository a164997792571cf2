//! Due-date and status calculators.
//!
//! All arithmetic happens on local calendar days. A strict `YYYY-MM-DD`
//! literal is read as a local date with no timezone shift; anything else goes
//! through a generic parser (RFC 3339 first, then a few naive layouts).

use chrono::{
    DateTime, Datelike, Days, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, WarrantyError};
use crate::models::WarrantyStatus;

/// A record due within this many days (inclusive) is expiring.
pub const EXPIRING_WINDOW_DAYS: i64 = 7;

#[allow(clippy::expect_used)]
static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"));

const NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a date-like string into a local instant.
///
/// `2024-06-01` becomes local midnight of that day; RFC 3339 values keep
/// their instant; naive date-times and `dd/mm/yyyy` are read as local time.
pub fn parse_date_like(input: &str) -> Result<DateTime<Local>> {
    let trimmed = input.trim();

    if DATE_ONLY.is_match(trimmed) {
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map_err(|e| WarrantyError::InvalidDate(format!("{trimmed}: {e}")))?;
        return start_of_day(date);
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Local));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return local_from_naive(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return start_of_day(date);
    }

    Err(WarrantyError::InvalidDate(trimmed.to_string()))
}

/// Parse a date-like string straight to its local calendar day.
pub fn parse_calendar_date(input: &str) -> Result<NaiveDate> {
    parse_date_like(input).map(|instant| instant.date_naive())
}

/// First instant of `date` in local time.
///
/// When midnight does not exist locally (a DST jump at 00:00), the first
/// valid instant of the day is used instead.
pub fn start_of_day(date: NaiveDate) -> Result<DateTime<Local>> {
    match Local.from_local_datetime(&date.and_time(NaiveTime::MIN)) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => (1..=3)
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
            .find_map(|time| Local.from_local_datetime(&date.and_time(time)).earliest())
            .ok_or_else(|| WarrantyError::InvalidDate(format!("no local midnight for {date}"))),
    }
}

fn local_from_naive(naive: NaiveDateTime) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map_or_else(|| start_of_day(naive.date()), Ok)
}

/// Move `date` by a signed number of calendar days.
pub fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.ok_or_else(|| WarrantyError::InvalidDate(format!("{date} shifted by {days} days")))
}

/// Due date for an exchange date plus `warranty_days` calendar days.
///
/// The result is local start-of-day of the due day, returned as a UTC
/// instant so it serializes the same on every device.
pub fn calculate_due_date(exchange_date: &str, warranty_days: i64) -> Result<DateTime<Utc>> {
    let start = parse_calendar_date(exchange_date)?;
    due_date_from(start, warranty_days)
}

/// [`calculate_due_date`] for an already parsed calendar day.
pub fn due_date_from(exchange_date: NaiveDate, warranty_days: i64) -> Result<DateTime<Utc>> {
    let due_day = shift_days(exchange_date, warranty_days)?;
    start_of_day(due_day).map(|instant| instant.with_timezone(&Utc))
}

/// Local calendar day of a stored due date.
#[must_use]
pub fn local_day(instant: &DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// Status of a due date as seen on `today`.
#[must_use]
pub fn determine_status(due_date: &DateTime<Utc>, today: NaiveDate) -> WarrantyStatus {
    status_for_days(local_day(due_date).signed_duration_since(today).num_days())
}

/// [`determine_status`] for a date-like string.
pub fn determine_status_str(due_date: &str, today: NaiveDate) -> Result<WarrantyStatus> {
    let due_day = parse_calendar_date(due_date)?;
    Ok(status_for_days(due_day.signed_duration_since(today).num_days()))
}

/// Map a signed day difference (due minus today) to a status.
#[must_use]
pub const fn status_for_days(days_until_due: i64) -> WarrantyStatus {
    if days_until_due < 0 {
        WarrantyStatus::Expired
    } else if days_until_due <= EXPIRING_WINDOW_DAYS {
        WarrantyStatus::Expiring
    } else {
        WarrantyStatus::Active
    }
}

/// Local `dd/mm/yyyy` rendering of an instant.
#[must_use]
pub fn format_date(instant: &DateTime<Utc>) -> String {
    format_day(local_day(instant))
}

/// `dd/mm/yyyy` rendering of a calendar day.
#[must_use]
pub fn format_day(date: NaiveDate) -> String {
    format!("{:02}/{:02}/{:04}", date.day(), date.month(), date.year())
}

/// `YYYY-MM-DD` rendering of a calendar day.
#[must_use]
pub fn to_iso_date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
