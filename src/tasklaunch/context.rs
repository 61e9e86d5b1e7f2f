use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::TaskLaunchRequestProperties;
use crate::keyvalue;

/// Arguments and environment contributed by upstream stages for a single
/// message. Arguments are a set: adding the same literal twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequestContext {
    #[serde(rename = "commandLineArgs", default)]
    command_line_args: BTreeSet<String>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
}

impl LaunchRequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_line_args(&self) -> &BTreeSet<String> {
        &self.command_line_args
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn add_command_line_arg(&mut self, arg: impl Into<String>) {
        self.command_line_args.insert(arg.into());
    }

    pub fn add_command_line_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_line_args
            .extend(args.into_iter().map(Into::into));
    }

    pub fn add_environment_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    pub fn add_environment<I, K, V>(&mut self, env: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// Union of `static_args` and the context arguments, without duplicates.
    /// Callers must not rely on the order of the result.
    pub fn merge_command_line_args(&self, static_args: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        static_args
            .iter()
            .chain(self.command_line_args.iter())
            .filter(|arg| seen.insert(arg.as_str()))
            .cloned()
            .collect()
    }

    /// Context environment, datasource defaults where absent, then the
    /// configured `environment-properties` on top.
    pub fn merge_environment_properties(
        &self,
        properties: &TaskLaunchRequestProperties,
    ) -> BTreeMap<String, String> {
        let mut merged = self.environment.clone();
        for (key, value) in properties.data_source_connection_properties() {
            merged.entry(key).or_insert(value);
        }
        merged.extend(keyvalue::parse(properties.environment_properties()));
        merged
    }
}
