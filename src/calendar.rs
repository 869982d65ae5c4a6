//! Date and time-of-day strings as stored in the task file.
//!
//! Task dates are written as `M/D/YY` without leading zeros (`5/15/24`). Every
//! comparison against "today" goes through this module so the calendar view and
//! the alarm check cannot disagree about the format.

use chrono::{NaiveDate, NaiveTime};

const TASK_DATE_FORMAT: &str = "%-m/%-d/%y";
const CLOCK_FORMAT: &str = "%H:%M";

pub fn task_date(date: NaiveDate) -> String {
    date.format(TASK_DATE_FORMAT).to_string()
}

/// Accepts `M/D/YY` and `MM/DD/YYYY` style input, padded or not.
pub fn parse_task_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let year_part = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }
    let year = year_part.parse::<i32>().ok()?;
    let year = if year_part.len() <= 2 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whether a stored task date falls on `date`. Unparseable strings never match.
pub fn task_date_matches(stored: &str, date: NaiveDate) -> bool {
    parse_task_date(stored) == Some(date)
}

pub fn clock_key(time: NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

/// Normalizes `H:M` input to zero-padded `HH:MM`.
pub fn normalize_clock(raw: &str) -> Option<String> {
    let (hour, minute) = raw.trim().split_once(':')?;
    let hour = hour.trim().parse::<u32>().ok()?;
    let minute = minute.trim().parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0).map(clock_key)
}
