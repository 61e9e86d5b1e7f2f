pub mod function;
pub mod task;
pub mod trigger;

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::errors::ConfigurationError;

pub use function::FunctionProperties;
pub use task::TaskLaunchRequestProperties;
pub use trigger::{TimeUnit, TriggerProperties};

/// Flat view over layered configuration. Keys are stored in canonical form so
/// `taskName`, `task-name` and `task_name` resolve to the same entry. The key
/// as last written is kept for map entries whose child names matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySource {
    values: BTreeMap<String, String>,
    raw_keys: BTreeMap<String, String>,
}

pub fn canonical_key(key: &str) -> String {
    key.trim()
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .chars()
                .filter(|ch| *ch != '-' && *ch != '_')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl PropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let canonical = canonical_key(key);
        self.raw_keys.insert(canonical.clone(), key.trim().to_string());
        self.values.insert(canonical, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&canonical_key(key)).map(String::as_str)
    }

    /// Value of the first key present, for properties with aliases.
    pub fn get_first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Non-blank string value.
    pub fn get_text(&self, keys: &[&str]) -> Option<String> {
        self.get_first(keys)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// A list is either a comma separated value or indexed keys
    /// (`args[0]`, `args[1]`, ...) as produced by flattened files.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        if let Some(raw) = self.get(key) {
            return raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
        }
        let base = canonical_key(key);
        let mut items = Vec::new();
        while let Some(item) = self.values.get(&format!("{base}[{}]", items.len())) {
            items.push(item.clone());
        }
        items
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim().parse::<i64>().map(Some).map_err(|_| {
            ConfigurationError::new(format!("`{key}` must be an integer, got `{raw}`")).into()
        })
    }

    /// Children of a map-shaped entry as `(name, value)`, with names as
    /// written in the source. `arg-expressions: {fileName: payload.name}`
    /// yields `("fileName", "payload.name")`.
    pub fn get_map(&self, key: &str) -> Vec<(String, String)> {
        let prefix = format!("{}.", canonical_key(key));
        let depth = prefix.matches('.').count();
        self.values
            .iter()
            .filter(|(canonical, _)| canonical.starts_with(&prefix))
            .map(|(canonical, value)| {
                let raw = self.raw_keys.get(canonical).unwrap_or(canonical);
                let name = raw
                    .split('.')
                    .filter(|segment| !segment.is_empty())
                    .skip(depth)
                    .collect::<Vec<_>>()
                    .join(".");
                (name, value.clone())
            })
            .collect()
    }

    /// Overlays `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: PropertySource) {
        self.values.extend(other.values);
        self.raw_keys.extend(other.raw_keys);
    }

    pub fn from_value(value: &Value) -> Self {
        let mut source = Self::new();
        flatten_into(&mut source, "", value);
        source
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file: {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let value: Value = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)
                .with_context(|| format!("invalid YAML config: {}", path.display()))?,
            "toml" => {
                let parsed: toml::Value = text
                    .parse()
                    .with_context(|| format!("invalid TOML config: {}", path.display()))?;
                serde_json::to_value(parsed)?
            }
            "json" => serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON config: {}", path.display()))?,
            other => {
                return Err(anyhow!(
                    "unsupported config format `{other}` for {}",
                    path.display()
                ))
            }
        };
        if !value.is_object() {
            return Err(anyhow!(
                "config file {} must contain a table at its root",
                path.display()
            ));
        }
        Ok(Self::from_value(&value))
    }

    /// Environment variables bind with `_` as the segment separator:
    /// `TRIGGER_FIXEDDELAY` is `trigger.fixeddelay`.
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut source = Self::new();
        for (name, value) in vars {
            let key = name.to_ascii_lowercase().replace('_', ".");
            source.set(&key, value);
        }
        source
    }

    /// Process environment. Variables whose name or value is not UTF-8 are
    /// skipped.
    pub fn from_env() -> Self {
        Self::from_env_vars(utf8_vars(env::vars_os()))
    }

    /// Accepts `key=value` and `--key=value`; a bare `--flag` reads as `true`.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let trimmed = arg.trim_start_matches('-');
            match trimmed.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => source.set(key, value),
                None if arg.starts_with("--") && !trimmed.is_empty() => {
                    source.set(trimmed, "true")
                }
                _ => {
                    return Err(ConfigurationError::new(format!(
                        "property override `{arg}` must look like key=value"
                    ))
                    .into())
                }
            }
        }
        Ok(source)
    }

    /// File, then environment, then explicit overrides.
    pub fn layered(
        file: Option<&Path>,
        environment: PropertySource,
        overrides: PropertySource,
    ) -> Result<Self> {
        let mut source = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };
        source.merge(environment);
        source.merge(overrides);
        Ok(source)
    }
}

fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}

fn flatten_into(source: &mut PropertySource, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map {
                let next = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(source, &next, entry);
            }
        }
        Value::Array(items) => {
            for (idx, entry) in items.iter().enumerate() {
                flatten_into(source, &format!("{prefix}[{idx}]"), entry);
            }
        }
        Value::Null => {}
        Value::String(text) => source.set(prefix, text.clone()),
        other => source.set(prefix, other.to_string()),
    }
}
