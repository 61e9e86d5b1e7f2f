use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::tasklaunch::context::LaunchRequestContext;

pub const CONTENT_TYPE: &str = "contentType";
pub const APPLICATION_JSON: &str = "application/json";

/// Wire name of the launch context slot. Only used when a message crosses
/// the JSON-lines boundary; in process the context travels in
/// [`Message::launch_context`].
pub const LAUNCH_CONTEXT_HEADER: &str = "taskLaunchRequestContext";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub payload: Value,
    pub headers: Map<String, Value>,
    pub launch_context: Option<LaunchRequestContext>,
}

impl Message {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            headers: Map::new(),
            launch_context: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    pub fn with_launch_context(mut self, context: LaunchRequestContext) -> Self {
        self.launch_context = Some(context);
        self
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(Value::as_str)
    }

    /// Context attached by an upstream stage, or a fresh one.
    pub fn take_launch_context(&mut self) -> LaunchRequestContext {
        self.launch_context.take().unwrap_or_default()
    }

    /// Accepts `{"headers": {...}, "payload": ...}`. Only an object carrying
    /// both keys is an envelope; anything else, `{"payload": 1}` included, is
    /// taken as a bare payload.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Ok(Self::new(value));
        };
        if !(map.contains_key("payload") && map.contains_key("headers")) {
            return Ok(Self::new(Value::Object(map)));
        }
        let payload = map.remove("payload").unwrap_or(Value::Null);
        let mut headers = match map.remove("headers") {
            Some(Value::Object(headers)) => headers,
            Some(Value::Null) | None => Map::new(),
            Some(other) => return Err(anyhow!("message headers must be an object, got {other}")),
        };
        let launch_context = match headers.remove(LAUNCH_CONTEXT_HEADER) {
            Some(raw) => Some(
                serde_json::from_value(raw)
                    .map_err(|err| anyhow!("invalid {LAUNCH_CONTEXT_HEADER} header: {err}"))?,
            ),
            None => None,
        };
        Ok(Self {
            payload,
            headers,
            launch_context,
        })
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(line).map_err(|err| anyhow!("invalid message JSON: {err}"))?;
        Self::from_json(value)
    }

    pub fn to_json(&self) -> Result<Value> {
        let mut headers = self.headers.clone();
        if let Some(context) = &self.launch_context {
            headers.insert(
                LAUNCH_CONTEXT_HEADER.to_string(),
                serde_json::to_value(context)?,
            );
        }
        let mut envelope = Map::new();
        envelope.insert("headers".to_string(), Value::Object(headers));
        envelope.insert("payload".to_string(), self.payload.clone());
        Ok(Value::Object(envelope))
    }
}
