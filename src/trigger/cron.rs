use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::errors::ConfigurationError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

// Five years covers every leap-day schedule.
const MAX_SEARCH_DAYS: u32 = 366 * 5;

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: Option<(&'static [&'static str], u32)>,
    allows_any: bool,
}

const SECOND: FieldSpec = FieldSpec {
    name: "second",
    min: 0,
    max: 59,
    names: None,
    allows_any: false,
};
const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: None,
    allows_any: false,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: None,
    allows_any: false,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: None,
    allows_any: true,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: Some((&MONTH_NAMES, 1)),
    allows_any: false,
};
// 7 is accepted as Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: Some((&DAY_NAMES, 0)),
    allows_any: true,
};

/// A six-field cron schedule: second, minute, hour, day-of-month, month and
/// day-of-week, evaluated in UTC. A day fires only when both day fields
/// match; `*` or `?` leaves a day field unrestricted.
#[derive(Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: u64,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        CronSchedule::parse(raw)
    }
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ConfigurationError> {
        let trimmed = expression.trim();
        let expanded = expand_macro(trimmed).unwrap_or(trimmed);
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(invalid(
                expression,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        }
        let parse = |raw: &str, field: FieldSpec| {
            parse_field(raw, field).map_err(|reason| invalid(expression, reason))
        };
        let mut days_of_week = parse(fields[5], DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }
        Ok(Self {
            expression: trimmed.to_string(),
            seconds: parse(fields[0], SECOND)?,
            minutes: parse(fields[1], MINUTE)?,
            hours: parse(fields[2], HOUR)?,
            days_of_month: parse(fields[3], DAY_OF_MONTH)?,
            months: parse(fields[4], MONTH)?,
            days_of_week,
        })
    }

    /// First matching instant strictly after `after`, at whole-second
    /// precision. `None` when nothing matches within the search window
    /// (e.g. `0 0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_nanosecond(0)? + Duration::seconds(1);
        let mut date = start.date_naive();
        let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
        let mut floor = start.time();
        for _ in 0..MAX_SEARCH_DAYS {
            if self.matches_date(date) {
                if let Some(time) = self.first_time_from(floor) {
                    return Some(Utc.from_utc_datetime(&date.and_time(time)));
                }
            }
            date = date.succ_opt()?;
            floor = midnight;
        }
        None
    }

    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        self.matches_date(instant.date_naive())
            && has(self.hours, instant.hour())
            && has(self.minutes, instant.minute())
            && has(self.seconds, instant.second())
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        has(self.months, date.month())
            && has(self.days_of_month, date.day())
            && has(self.days_of_week, date.weekday().num_days_from_sunday())
    }

    fn first_time_from(&self, floor: NaiveTime) -> Option<NaiveTime> {
        for hour in floor.hour()..24 {
            if !has(self.hours, hour) {
                continue;
            }
            let same_hour = hour == floor.hour();
            let minute_start = if same_hour { floor.minute() } else { 0 };
            for minute in minute_start..60 {
                if !has(self.minutes, minute) {
                    continue;
                }
                let second_start = if same_hour && minute == floor.minute() {
                    floor.second()
                } else {
                    0
                };
                if let Some(second) = (second_start..60).find(|s| has(self.seconds, *s)) {
                    return NaiveTime::from_hms_opt(hour, minute, second);
                }
            }
        }
        None
    }
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn invalid(expression: &str, reason: String) -> ConfigurationError {
    ConfigurationError::new(format!("invalid cron expression `{expression}`: {reason}"))
}

fn expand_macro(expression: &str) -> Option<&'static str> {
    match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

fn parse_field(raw: &str, field: FieldSpec) -> Result<u64, String> {
    let mut mask = 0u64;
    for part in raw.split(',') {
        mask |= parse_part(part.trim(), field)?;
    }
    Ok(mask)
}

fn parse_part(part: &str, field: FieldSpec) -> Result<u64, String> {
    if part.is_empty() {
        return Err(format!("empty {} entry", field.name));
    }
    if part == "?" {
        if !field.allows_any {
            return Err(format!("`?` is not allowed in the {} field", field.name));
        }
        return Ok(range_mask(field.min, field.max, 1));
    }
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid {} step `{step}`", field.name))?;
            if step == 0 {
                return Err(format!("{} step must be positive", field.name));
            }
            (range, Some(step))
        }
        None => (part, None),
    };
    let (start, end) = if range == "*" {
        (field.min, field.max)
    } else if let Some((low, high)) = range.split_once('-') {
        let low = parse_value(low, field)?;
        let high = parse_value(high, field)?;
        if low > high {
            return Err(format!("{} range `{range}` is reversed", field.name));
        }
        (low, high)
    } else {
        let value = parse_value(range, field)?;
        // `5/10` means every 10 starting at 5.
        let end = if step.is_some() { field.max } else { value };
        (value, end)
    };
    Ok(range_mask(start, end, step.unwrap_or(1)))
}

fn parse_value(raw: &str, field: FieldSpec) -> Result<u32, String> {
    let raw = raw.trim();
    if let Some((names, offset)) = field.names {
        let upper = raw.to_ascii_uppercase();
        if let Some(idx) = names.iter().position(|name| *name == upper) {
            return Ok(idx as u32 + offset);
        }
    }
    let value: u32 = raw
        .parse()
        .map_err(|_| format!("invalid {} value `{raw}`", field.name))?;
    if value < field.min || value > field.max {
        return Err(format!(
            "{} value {value} is outside {}-{}",
            field.name, field.min, field.max
        ));
    }
    Ok(value)
}

fn range_mask(start: u32, end: u32, step: u32) -> u64 {
    (start..=end)
        .step_by(step as usize)
        .fold(0u64, |mask, value| mask | (1u64 << value))
}
