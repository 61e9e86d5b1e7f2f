use std::fmt;
use std::io::{stderr, Write};
use std::str::FromStr;

use humantime::format_rfc3339_millis;
use serde_json::{Map, Value};

use crate::errors::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" | "fatal" => Ok(Level::Error),
            other => Err(ConfigurationError::new(format!(
                "unsupported log level: {other}"
            ))),
        }
    }
}

/// Receives finished log entries. Bound on the registry to reroute kernel
/// logs; without a binding entries go to stderr as JSON lines.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &Map<String, Value>);
}

impl<F> LogSink for F
where
    F: Fn(&Map<String, Value>) + Send + Sync,
{
    fn write(&self, entry: &Map<String, Value>) {
        (self)(entry)
    }
}

fn current_timestamp() -> String {
    format_rfc3339_millis(std::time::SystemTime::now()).to_string()
}

/// Keeps scalar tags only.
pub(crate) fn stable_tags(tags: Map<String, Value>) -> Map<String, Value> {
    tags.into_iter()
        .filter(|(_, val)| matches!(val, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .collect()
}

pub(crate) fn build_entry(
    level: Level,
    message: String,
    data: Option<Value>,
    tags: Map<String, Value>,
) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("level".to_string(), Value::String(level.as_str().to_string()));
    entry.insert("message".to_string(), Value::String(message));
    match data {
        Some(Value::Null) | None => {}
        Some(Value::Object(map)) => {
            entry.insert("data".to_string(), Value::Object(map));
        }
        Some(other) => {
            let mut wrapper = Map::new();
            wrapper.insert("value".to_string(), other);
            entry.insert("data".to_string(), Value::Object(wrapper));
        }
    }
    if !tags.is_empty() {
        entry.insert("tags".to_string(), Value::Object(tags));
    }
    entry.insert("timestamp".to_string(), Value::String(current_timestamp()));
    entry
}

pub(crate) fn write_fallback(entry: &Map<String, Value>) {
    if let Ok(serialized) = serde_json::to_string(entry) {
        let _ = writeln!(stderr(), "{}", serialized);
    }
}
