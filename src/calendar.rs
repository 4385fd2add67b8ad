//! Interval-grid and timestamp helpers.
//!
//! All timestamps are naive local-standard times on a 15-minute grid; a full
//! non-leap building-year is [`INTERVALS_PER_YEAR`] records.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

/// Length of one metering interval in minutes.
pub const INTERVAL_MINUTES: i64 = 15;
/// Number of intervals in one hour.
pub const INTERVALS_PER_HOUR: usize = 4;
/// Number of intervals in a 365-day year.
pub const INTERVALS_PER_YEAR: usize = 365 * 24 * INTERVALS_PER_HOUR;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Duration of one interval.
pub fn interval() -> Duration {
    Duration::minutes(INTERVAL_MINUTES)
}

/// Parses a timestamp in any of the accepted layouts.
///
/// A bare `%Y-%m-%d` date is read as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Rounds `ts` down to the start of its interval.
pub fn floor_to_interval(ts: NaiveDateTime) -> NaiveDateTime {
    let minute = ts.minute() as i64;
    let excess = Duration::minutes(minute % INTERVAL_MINUTES)
        + Duration::seconds(ts.second() as i64)
        + Duration::nanoseconds(ts.nanosecond() as i64);
    ts - excess
}

/// Rounds `ts` up to the next grid point, or returns it unchanged when already aligned.
pub fn ceil_to_interval(ts: NaiveDateTime) -> NaiveDateTime {
    let floor = floor_to_interval(ts);
    if floor == ts { ts } else { floor + interval() }
}

/// Every grid point in `[start, end]`, starting at `start` rounded up to the grid.
pub fn interval_grid(start: NaiveDateTime, end: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> {
    let step = interval();
    std::iter::successors(Some(ceil_to_interval(start)), move |t| Some(*t + step))
        .take_while(move |t| *t <= end)
}

/// Full-year grid beginning at midnight on January 1 of `year`.
pub fn year_grid(year: i32) -> Vec<NaiveDateTime> {
    let Some(start) = NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return Vec::new();
    };
    let Some(end) = NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.and_hms_opt(23, 45, 0)) else {
        return Vec::new();
    };
    interval_grid(start, end).collect()
}
