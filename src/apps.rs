//! Built-in units available to every host: a time source, a logging sink and
//! the task launch request transformers.

use anyhow::Result;
use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::config::trigger::DEFAULT_DATE_FORMAT;
use crate::config::{FunctionProperties, PropertySource, TaskLaunchRequestProperties};
use crate::errors::ConfigurationError;
use crate::logging::Level;
use crate::message::Message;
use crate::registry::{Context, Registry};
use crate::tasklaunch::request::{
    GENERIC_FUNCTION_NAME, PLATFORM_FUNCTION_NAME, STANDALONE_FUNCTION_NAME,
};
use crate::tasklaunch::{LaunchMode, LaunchRequestBuilder, LaunchRequestType};

pub const TIME_SOURCE_NAME: &str = "timeSource";
pub const LOG_SINK_NAME: &str = "logSink";

const DEFAULT_LOG_NAME: &str = "log-sink";

pub fn register_builtins(registry: &Registry, source: &PropertySource) -> Result<()> {
    register_time_source(registry, source)?;
    register_log_sink(registry, source)?;
    register_task_launch_request(registry, source)?;
    Ok(())
}

pub fn register_time_source(registry: &Registry, source: &PropertySource) -> Result<()> {
    let format = source
        .get_text(&["time.date-format"])
        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
    if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
        return Err(
            ConfigurationError::new(format!("time.date-format `{format}` is not valid")).into(),
        );
    }
    registry.register_supplier(
        TIME_SOURCE_NAME,
        move |_ctx: &mut Context| -> Result<Option<Message>> {
            let now = Utc::now().format(&format).to_string();
            Ok(Some(Message::new(Value::String(now))))
        },
    );
    Ok(())
}

pub fn register_log_sink(registry: &Registry, source: &PropertySource) -> Result<()> {
    let level = match source.get_text(&["log.level"]) {
        Some(raw) => raw.parse::<Level>()?,
        None => Level::Info,
    };
    let name = source
        .get_text(&["log.name"])
        .unwrap_or_else(|| DEFAULT_LOG_NAME.to_string());
    registry.register_consumer(
        LOG_SINK_NAME,
        move |ctx: &mut Context, message: Message| -> Result<()> {
            let text = match &message.payload {
                Value::String(text) => text.clone(),
                other => serde_json::to_string(other)?,
            };
            let mut tags = Map::new();
            tags.insert("log".to_string(), Value::String(name.clone()));
            ctx.push_log_tags(tags);
            let data = (!message.headers.is_empty())
                .then(|| json!({ "headers": Value::Object(message.headers.clone()) }));
            ctx.log(level, text, data);
            ctx.pop_log_tags();
            Ok(())
        },
    );
    Ok(())
}

/// Registers the three launch request transformers over one builder. The
/// generic `taskLaunchRequest` picks its mode from `function.definition` and
/// passes messages through when neither flavour is named there.
pub fn register_task_launch_request(registry: &Registry, source: &PropertySource) -> Result<()> {
    let builder = LaunchRequestBuilder::new(TaskLaunchRequestProperties::from_source(source))?;
    let definition = FunctionProperties::from_source(source);
    let generic_mode = LaunchRequestType::from_definition(definition.definition()).mode();

    let platform = builder.clone();
    registry.register_function(
        PLATFORM_FUNCTION_NAME,
        move |ctx: &mut Context, message: Message| -> Result<Message> {
            platform.build(ctx, message, LaunchMode::Platform)
        },
    );
    let standalone = builder.clone();
    registry.register_function(
        STANDALONE_FUNCTION_NAME,
        move |ctx: &mut Context, message: Message| -> Result<Message> {
            standalone.build(ctx, message, LaunchMode::Standalone)
        },
    );
    registry.register_function(
        GENERIC_FUNCTION_NAME,
        move |ctx: &mut Context, message: Message| -> Result<Message> {
            match generic_mode {
                Some(mode) => builder.build(ctx, message, mode),
                None => Ok(message),
            }
        },
    );
    Ok(())
}
