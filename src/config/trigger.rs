use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::errors::ConfigurationError;

use super::PropertySource;

pub const CRON_TRIGGER_OPTION: &str = "trigger.cron";
pub const DATE_TRIGGER_OPTION: &str = "trigger.date";

pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%y %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NANOSECONDS" => Ok(TimeUnit::Nanoseconds),
            "MICROSECONDS" => Ok(TimeUnit::Microseconds),
            "MILLISECONDS" => Ok(TimeUnit::Milliseconds),
            "SECONDS" => Ok(TimeUnit::Seconds),
            "MINUTES" => Ok(TimeUnit::Minutes),
            "HOURS" => Ok(TimeUnit::Hours),
            "DAYS" => Ok(TimeUnit::Days),
            other => Err(ConfigurationError::new(format!(
                "unknown trigger.time-unit `{other}`"
            ))),
        }
    }
}

/// Trigger options as configured. Interpretation into a trigger happens in
/// [`crate::trigger::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerProperties {
    pub cron: Option<String>,
    pub date: Option<String>,
    pub date_format: String,
    pub fixed_delay: Duration,
    pub initial_delay: Duration,
    pub time_unit: TimeUnit,
    pub max_messages: i64,
}

impl Default for TriggerProperties {
    fn default() -> Self {
        Self {
            cron: None,
            date: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            fixed_delay: Duration::from_secs(1),
            initial_delay: Duration::ZERO,
            time_unit: TimeUnit::Seconds,
            max_messages: -1,
        }
    }
}

impl TriggerProperties {
    pub fn from_source(source: &PropertySource) -> Result<Self> {
        let defaults = Self::default();
        let time_unit = match source.get("trigger.time-unit") {
            Some(raw) => raw.parse::<TimeUnit>()?,
            None => defaults.time_unit,
        };
        let fixed_delay = match source.get("trigger.fixed-delay") {
            Some(raw) => parse_delay("trigger.fixed-delay", raw, time_unit)?,
            None => time_unit.duration(1),
        };
        let initial_delay = match source.get("trigger.initial-delay") {
            Some(raw) => parse_delay("trigger.initial-delay", raw, time_unit)?,
            None => defaults.initial_delay,
        };
        Ok(Self {
            cron: source.get_text(&[CRON_TRIGGER_OPTION]),
            date: source.get_text(&[DATE_TRIGGER_OPTION]),
            date_format: source
                .get_text(&["trigger.date-format"])
                .unwrap_or(defaults.date_format),
            fixed_delay,
            initial_delay,
            time_unit,
            max_messages: source
                .get_i64("trigger.max-messages")?
                .unwrap_or(defaults.max_messages),
        })
    }
}

/// A bare integer counts in `unit`; anything else must be a humantime
/// duration such as `250ms` or `2m`.
fn parse_delay(name: &str, raw: &str, unit: TimeUnit) -> Result<Duration> {
    let trimmed = raw.trim();
    if let Ok(amount) = trimmed.parse::<u64>() {
        return Ok(unit.duration(amount));
    }
    humantime::parse_duration(trimmed).map_err(|err| {
        ConfigurationError::new(format!("`{name}` is not a valid delay `{raw}`: {err}")).into()
    })
}
