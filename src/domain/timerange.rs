// Time range domain model - Grafana relative time expressions
//
// Supported forms:
//   1700000000       unix timestamp in seconds
//   now
//   now-5m           shift back (count defaults to 1)
//   now/d            start or end of the current period
//   now-1w/w         shift back, then snap to the period boundary
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Format used when timestamps are printed in reports
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S +0000 UTC";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("time value is not valid: {0}")]
    InvalidExpression(String),
    #[error("time value is out of range: {0}")]
    OutOfRange(String),
    #[error("unknown time range boundary {0:?}, expected \"from\" or \"to\"")]
    InvalidRole(String),
}

/// A time range bound that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not convert parameter \"{role}\" to timestamp: {source}")]
pub struct BoundaryError {
    pub role: Role,
    #[source]
    pub source: TimeRangeError,
}

/// Which end of a time range an expression describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    From,
    To,
}

impl FromStr for Role {
    type Err = TimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("from") {
            Ok(Role::From)
        } else if s.eq_ignore_ascii_case("to") {
            Ok(Role::To)
        } else {
            Err(TimeRangeError::InvalidRole(s.to_string()))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::From => f.write_str("from"),
            Role::To => f.write_str("to"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "s" => Some(Unit::Second),
            "m" => Some(Unit::Minute),
            "h" => Some(Unit::Hour),
            "d" => Some(Unit::Day),
            "w" => Some(Unit::Week),
            "M" => Some(Unit::Month),
            "y" => Some(Unit::Year),
            _ => None,
        }
    }
}

/// Raw and resolved bounds of the requested time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

impl TimeRange {
    pub fn resolve(now: DateTime<Utc>, from: &str, to: &str) -> Result<Self, BoundaryError> {
        let bound = |expression: &str, role: Role| {
            resolve(now, expression, role).map_err(|source| BoundaryError { role, source })
        };
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            date_from: bound(from, Role::From)?,
            date_to: bound(to, Role::To)?,
        })
    }
}

/// Resolve a time expression against `now`. The role only matters for boundary snaps.
pub fn resolve(now: DateTime<Utc>, expression: &str, role: Role) -> Result<DateTime<Utc>, TimeRangeError> {
    let invalid = || TimeRangeError::InvalidExpression(expression.to_string());
    let out_of_range = || TimeRangeError::OutOfRange(expression.to_string());

    if let Ok(seconds) = expression.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0).ok_or_else(out_of_range);
    }

    if expression.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(unit) = expression.strip_prefix("now/") {
        let unit = Unit::parse(unit).ok_or_else(invalid)?;
        return snap(now, unit, role, expression);
    }

    let Some(relative) = expression.strip_prefix("now-") else {
        return Err(invalid());
    };
    let (shift_part, snap_part) = match relative.split_once('/') {
        Some((shift_part, snap_part)) => (shift_part, Some(snap_part)),
        None => (relative, None),
    };

    let digits_end = shift_part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(shift_part.len());
    let (count, unit) = shift_part.split_at(digits_end);
    let count: u32 = if count.is_empty() {
        1
    } else {
        count.parse().map_err(|_| out_of_range())?
    };
    let unit = Unit::parse(unit).ok_or_else(invalid)?;
    let shifted = shift_back(now, count, unit).ok_or_else(out_of_range)?;

    match snap_part {
        None => Ok(shifted),
        Some(snap_unit) => {
            let snap_unit = Unit::parse(snap_unit).ok_or_else(invalid)?;
            snap(shifted, snap_unit, role, expression)
        }
    }
}

/// Step back `count` units. Sub-day units are fixed durations, the rest follow the calendar.
fn shift_back(instant: DateTime<Utc>, count: u32, unit: Unit) -> Option<DateTime<Utc>> {
    let seconds = |per_unit: i64| {
        TimeDelta::try_seconds(i64::from(count) * per_unit).and_then(|d| instant.checked_sub_signed(d))
    };
    match unit {
        Unit::Second => seconds(1),
        Unit::Minute => seconds(60),
        Unit::Hour => seconds(3600),
        Unit::Day => instant.checked_sub_days(Days::new(u64::from(count))),
        Unit::Week => instant.checked_sub_days(Days::new(7 * u64::from(count))),
        Unit::Month => instant.checked_sub_months(Months::new(count)),
        Unit::Year => instant.checked_sub_months(Months::new(count.checked_mul(12)?)),
    }
}

/// Start (`from`) or end (`to`) of the period of `unit` containing `instant`.
/// `expression` only names the input in errors.
fn snap(instant: DateTime<Utc>, unit: Unit, role: Role, expression: &str) -> Result<DateTime<Utc>, TimeRangeError> {
    let date = instant.date_naive();
    let naive = match unit {
        Unit::Second => return Err(TimeRangeError::InvalidExpression(expression.to_string())),
        Unit::Minute => at_time(date, instant.hour(), instant.minute(), role),
        Unit::Hour => {
            let minute = if role == Role::From { 0 } else { 59 };
            at_time(date, instant.hour(), minute, role)
        }
        Unit::Day => day_boundary(date, date, role),
        Unit::Week => {
            let first = date.checked_sub_days(Days::new(u64::from(instant.weekday().num_days_from_sunday())));
            first.and_then(|first| day_boundary(first, first.checked_add_days(Days::new(6))?, role))
        }
        Unit::Month => {
            let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1);
            first.and_then(|first| day_boundary(first, last_day_of_month(first)?, role))
        }
        Unit::Year => {
            let first = NaiveDate::from_ymd_opt(date.year(), 1, 1);
            let last = NaiveDate::from_ymd_opt(date.year(), 12, 31);
            first.zip(last).and_then(|(first, last)| day_boundary(first, last, role))
        }
    };
    naive
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimeRangeError::OutOfRange(expression.to_string()))
}

fn day_boundary(first: NaiveDate, last: NaiveDate, role: Role) -> Option<NaiveDateTime> {
    match role {
        Role::From => first.and_hms_opt(0, 0, 0),
        Role::To => last.and_hms_nano_opt(23, 59, 59, 999_999_999),
    }
}

fn at_time(date: NaiveDate, hour: u32, minute: u32, role: Role) -> Option<NaiveDateTime> {
    match role {
        Role::From => date.and_hms_opt(hour, minute, 0),
        Role::To => date.and_hms_nano_opt(hour, minute, 59, 999_999_999),
    }
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    first.checked_add_months(Months::new(1))?.pred_opt()
}
