use std::collections::BTreeMap;

use crate::keyvalue;

use super::PropertySource;

pub const DATASOURCE_URL_PROPERTY_KEY: &str = "spring.datasource.url";
pub const DATASOURCE_USERNAME_PROPERTY_KEY: &str = "spring.datasource.username";
pub const DATASOURCE_PASSWORD_PROPERTY_KEY: &str = "spring.datasource.password";

const DEFAULT_DATASOURCE_URL: &str = "jdbc:h2:tcp://localhost:19092/mem:dataflow";
const DEFAULT_DATASOURCE_USERNAME: &str = "sa";

const PREFIX: &str = "task.launch.request";

/// Static configuration of the task launch request transformers. Built once
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLaunchRequestProperties {
    task_name: Option<String>,
    args: Vec<String>,
    arg_expressions: Vec<(String, String)>,
    deployment_properties: String,
    environment_properties: String,
    resource_uri: String,
    data_source_url: String,
    data_source_user_name: String,
    data_source_password: Option<String>,
}

impl Default for TaskLaunchRequestProperties {
    fn default() -> Self {
        Self {
            task_name: None,
            args: Vec::new(),
            arg_expressions: Vec::new(),
            deployment_properties: String::new(),
            environment_properties: String::new(),
            resource_uri: String::new(),
            data_source_url: DEFAULT_DATASOURCE_URL.to_string(),
            data_source_user_name: DEFAULT_DATASOURCE_USERNAME.to_string(),
            data_source_password: None,
        }
    }
}

fn key(name: &str) -> String {
    format!("{PREFIX}.{name}")
}

/// A `k=v,...` list, either written as one string or as a map in a
/// configuration file.
fn key_value_text(source: &PropertySource, name: &str) -> String {
    match source.get(name) {
        Some(raw) => raw.to_string(),
        None => source
            .get_map(name)
            .into_iter()
            .map(|(child, value)| format!("{child}={value}"))
            .collect::<Vec<_>>()
            .join(","),
    }
}

impl TaskLaunchRequestProperties {
    pub fn from_source(source: &PropertySource) -> Self {
        let defaults = Self::default();
        let task_name = source.get_text(&[&key("task-name"), &key("application-name")]);
        let mut arg_expressions = source
            .get(&key("arg-expressions"))
            .map(keyvalue::parse_pairs)
            .unwrap_or_default();
        for (name, template) in source.get_map(&key("arg-expressions")) {
            match arg_expressions.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = template,
                None => arg_expressions.push((name, template)),
            }
        }
        Self {
            task_name,
            args: source.get_list(&key("args")),
            arg_expressions,
            deployment_properties: key_value_text(source, &key("deployment-properties")),
            environment_properties: key_value_text(source, &key("environment-properties")),
            resource_uri: source
                .get_text(&[&key("resource-uri"), "task.resource-uri"])
                .unwrap_or_default(),
            data_source_url: source
                .get_text(&[&key("data-source-url"), "task.data-source-url"])
                .unwrap_or(defaults.data_source_url),
            data_source_user_name: source
                .get_text(&[&key("data-source-user-name"), "task.data-source-user-name"])
                .unwrap_or(defaults.data_source_user_name),
            data_source_password: source
                .get_text(&[&key("data-source-password"), "task.data-source-password"]),
        }
    }

    pub fn with_task_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = Some(name.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_arg_expressions(mut self, raw: &str) -> Self {
        self.arg_expressions = keyvalue::parse_pairs(raw);
        self
    }

    pub fn with_deployment_properties(mut self, raw: impl Into<String>) -> Self {
        self.deployment_properties = raw.into();
        self
    }

    pub fn with_environment_properties(mut self, raw: impl Into<String>) -> Self {
        self.environment_properties = raw.into();
        self
    }

    pub fn with_resource_uri(mut self, uri: impl Into<String>) -> Self {
        self.resource_uri = uri.into();
        self
    }

    pub fn with_data_source_password(mut self, password: impl Into<String>) -> Self {
        self.data_source_password = Some(password.into());
        self
    }

    /// Non-blank task name, if configured.
    pub fn task_name(&self) -> Option<&str> {
        self.task_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg_expressions(&self) -> &[(String, String)] {
        &self.arg_expressions
    }

    pub fn deployment_properties(&self) -> &str {
        &self.deployment_properties
    }

    pub fn environment_properties(&self) -> &str {
        &self.environment_properties
    }

    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    pub fn data_source_url(&self) -> &str {
        &self.data_source_url
    }

    pub fn data_source_user_name(&self) -> &str {
        &self.data_source_user_name
    }

    pub fn data_source_password(&self) -> Option<&str> {
        self.data_source_password.as_deref()
    }

    /// Datasource connection settings keyed the way the launched task reads
    /// them. An unset password is left out.
    pub fn data_source_connection_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(
            DATASOURCE_URL_PROPERTY_KEY.to_string(),
            self.data_source_url.clone(),
        );
        props.insert(
            DATASOURCE_USERNAME_PROPERTY_KEY.to_string(),
            self.data_source_user_name.clone(),
        );
        if let Some(password) = &self.data_source_password {
            props.insert(DATASOURCE_PASSWORD_PROPERTY_KEY.to_string(), password.clone());
        }
        props
    }
}
