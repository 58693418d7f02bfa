use crate::error::{ScheduleError, ScheduleResult};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimezoneMarker {
    #[default]
    Utc,
    Fixed(FixedOffset),
    Named(Tz),
}

impl TimezoneMarker {
    pub fn parse(value: &str) -> ScheduleResult<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("utc") || value == "Z" {
            return Ok(Self::Utc);
        }
        if value.starts_with('+') || value.starts_with('-') {
            return parse_offset(value).map(Self::Fixed);
        }
        Tz::from_str(value)
            .map(Self::Named)
            .map_err(|_| ScheduleError::MalformedDate(format!("unknown timezone marker '{value}'")))
    }

    pub fn as_marker(&self) -> String {
        match self {
            Self::Utc => String::new(),
            Self::Fixed(offset) => format_offset(offset.local_minus_utc()),
            Self::Named(tz) => tz.name().to_string(),
        }
    }
}

impl fmt::Display for TimezoneMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("UTC"),
            other => f.write_str(&other.as_marker()),
        }
    }
}

fn parse_offset(value: &str) -> ScheduleResult<FixedOffset> {
    let malformed = || ScheduleError::MalformedDate(format!("invalid UTC offset '{value}'"));
    let sign = if value.starts_with('-') { -1 } else { 1 };
    let digits = &value[1..];
    if !digits.is_ascii() {
        return Err(malformed());
    }
    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours = hours.parse::<i32>().map_err(|_| malformed())?;
    let minutes = minutes.parse::<i32>().map_err(|_| malformed())?;
    if hours > 14 || minutes > 59 {
        return Err(malformed());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(malformed)
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{sign}{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

pub fn to_wall(utc: DateTime<Utc>, tz: &TimezoneMarker) -> NaiveDateTime {
    match tz {
        TimezoneMarker::Utc => utc.naive_utc(),
        TimezoneMarker::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        TimezoneMarker::Named(zone) => utc.with_timezone(zone).naive_local(),
    }
}

pub fn to_utc(wall: NaiveDateTime, tz: &TimezoneMarker) -> ScheduleResult<DateTime<Utc>> {
    let resolved = match tz {
        TimezoneMarker::Utc => return Ok(Utc.from_utc_datetime(&wall)),
        TimezoneMarker::Fixed(offset) => single_or_earliest(offset.from_local_datetime(&wall)),
        TimezoneMarker::Named(zone) => single_or_earliest(zone.from_local_datetime(&wall)),
    };
    resolved.ok_or_else(|| {
        ScheduleError::MalformedDate(format!("wall-clock time {wall} does not exist in {tz}"))
    })
}

fn single_or_earliest<T: TimeZone>(result: LocalResult<DateTime<T>>) -> Option<DateTime<Utc>> {
    match result {
        LocalResult::Single(value) => Some(value.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

pub fn parse_utc(value: &str, field_name: &str) -> ScheduleResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| ScheduleError::MalformedDate(format!("{field_name} '{value}': {error}")))
}

pub fn format_utc(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn contains_instant(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Half-open intersection. A zero-length period is checked as a point against the other
/// period taken as closed.
pub fn intersects(a: &Period, b: &Period) -> bool {
    match (a.is_instant(), b.is_instant()) {
        (true, true) => a.start == b.start,
        (true, false) => b.start <= a.start && a.start <= b.end,
        (false, true) => a.start <= b.start && b.start <= a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

pub fn contains(outer: &Period, inner: &Period) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> ScheduleResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(ScheduleError::MalformedDate(format!("month {month} out of range")));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || ScheduleError::MalformedDate(format!("month must be YYYY-MM: '{value}'"));
        let (year, month) = value.trim().split_once('-').ok_or_else(malformed)?;
        let year = year.parse::<i32>().map_err(|_| malformed())?;
        let month = month.parse::<u32>().map_err(|_| malformed())?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn month_days(month: YearMonth) -> Vec<NaiveDate> {
    let first = month.first_day();
    first
        .iter_days()
        .take_while(|day| day.month() == month.month && day.year() == month.year)
        .collect()
}

pub fn day_window(date: NaiveDate, tz: &TimezoneMarker) -> ScheduleResult<Period> {
    let next = date
        .succ_opt()
        .ok_or_else(|| ScheduleError::MalformedDate(format!("no day after {date}")))?;
    Ok(Period::new(day_start(date, tz)?, day_start(next, tz)?))
}

pub fn month_window(month: YearMonth, tz: &TimezoneMarker) -> ScheduleResult<Period> {
    Ok(Period::new(
        day_start(month.first_day(), tz)?,
        day_start(month.next().first_day(), tz)?,
    ))
}

pub fn wall_date(utc: DateTime<Utc>, tz: &TimezoneMarker) -> NaiveDate {
    to_wall(utc, tz).date()
}

pub fn wall_minutes(start: DateTime<Utc>, end: DateTime<Utc>, tz: &TimezoneMarker) -> i64 {
    (to_wall(end, tz) - to_wall(start, tz)).num_minutes()
}

// Zones that switch to DST at midnight skip 00:00; such a day begins where the gap ends.
fn day_start(date: NaiveDate, tz: &TimezoneMarker) -> ScheduleResult<DateTime<Utc>> {
    let midnight = date.and_time(NaiveTime::MIN);
    let mut wall = midnight;
    while wall.date() == date {
        if let Ok(utc) = to_utc(wall, tz) {
            return Ok(utc);
        }
        wall += Duration::minutes(15);
    }
    to_utc(midnight, tz)
}
