//! Trigger selection for supplier polling.

pub mod cron;
pub mod poller;

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::config::trigger::{CRON_TRIGGER_OPTION, DATE_TRIGGER_OPTION};
use crate::config::TriggerProperties;
use crate::errors::ConfigurationError;

pub use cron::CronSchedule;
pub use poller::{PollSummary, Poller};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    Cron(CronSchedule),
    Periodic {
        period: Duration,
        initial_delay: Duration,
    },
    OneShot(DateTime<Utc>),
}

impl TriggerSpec {
    /// Next instant to poll at. `previous` is when the last tick completed,
    /// `None` before the first one. `None` means the trigger is exhausted.
    pub fn next_fire(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match (self, previous) {
            (TriggerSpec::Cron(schedule), _) => schedule.next_after(now),
            (TriggerSpec::Periodic { initial_delay, .. }, None) => add_duration(now, *initial_delay),
            (TriggerSpec::Periodic { period, .. }, Some(completed)) => {
                add_duration(completed, *period)
            }
            (TriggerSpec::OneShot(fire_at), None) => Some(*fire_at),
            (TriggerSpec::OneShot(_), Some(_)) => None,
        }
    }
}

fn add_duration(instant: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSelection {
    pub trigger: TriggerSpec,
    pub max_messages_per_poll: u64,
}

/// Picks exactly one trigger. Cron and date are mutually exclusive; with
/// neither configured the trigger is periodic.
pub fn select(properties: &TriggerProperties) -> Result<TriggerSelection> {
    let trigger = match (&properties.cron, &properties.date) {
        (Some(_), Some(_)) => {
            return Err(ConfigurationError::new(format!(
                "only one of `{CRON_TRIGGER_OPTION}` and `{DATE_TRIGGER_OPTION}` may be set"
            ))
            .into())
        }
        (Some(expression), None) => TriggerSpec::Cron(CronSchedule::parse(expression)?),
        (None, Some(date)) => TriggerSpec::OneShot(parse_date(date, &properties.date_format)?),
        (None, None) => TriggerSpec::Periodic {
            period: properties.fixed_delay,
            initial_delay: properties.initial_delay,
        },
    };
    let max_messages_per_poll = u64::try_from(properties.max_messages).unwrap_or(1);
    Ok(TriggerSelection {
        trigger,
        max_messages_per_poll,
    })
}

/// RFC 3339, or `format` read as UTC. A format without time fields fires at
/// midnight.
pub fn parse_date(raw: &str, format: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    match NaiveDate::parse_from_str(raw, format) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| ConfigurationError::new(format!("invalid trigger.date `{raw}`")).into()),
        Err(err) => Err(ConfigurationError::new(format!(
            "trigger.date `{raw}` does not match `{format}`: {err}"
        ))
        .into()),
    }
}
