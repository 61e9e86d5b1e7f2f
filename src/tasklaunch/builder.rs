use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use crate::config::TaskLaunchRequestProperties;
use crate::errors::ConfigurationError;
use crate::logging::Level;
use crate::message::{Message, APPLICATION_JSON, CONTENT_TYPE, LAUNCH_CONTEXT_HEADER};
use crate::registry::Context;

use super::context::LaunchRequestContext;
use super::deployment::resolve_deployment_properties;
use super::expressions::ArgExpressionEvaluator;
use super::request::{LaunchMode, LaunchRequest, PlatformLaunchRequest, StandaloneLaunchRequest};

/// Turns inbound messages into task launch requests. Shares its configuration
/// and compiled expressions between clones.
#[derive(Clone)]
pub struct LaunchRequestBuilder {
    properties: Arc<TaskLaunchRequestProperties>,
    expressions: ArgExpressionEvaluator,
}

impl LaunchRequestBuilder {
    /// Fails when an argument expression does not compile.
    pub fn new(properties: TaskLaunchRequestProperties) -> Result<Self> {
        let expressions = ArgExpressionEvaluator::compile(properties.arg_expressions())?;
        Ok(Self {
            properties: Arc::new(properties),
            expressions,
        })
    }

    fn task_name(&self) -> Result<&str> {
        self.properties.task_name().ok_or_else(|| {
            ConfigurationError::new("'taskName' is required (task.launch.request.task-name)")
                .into()
        })
    }

    /// The descriptor for `message`, without touching the message itself.
    pub fn launch_request(
        &self,
        message: &Message,
        context: &LaunchRequestContext,
        mode: LaunchMode,
    ) -> Result<LaunchRequest> {
        let name = self.task_name()?.to_string();
        let mut static_args = self.properties.args().to_vec();
        static_args.extend(self.expressions.evaluate(message)?);
        let args = context.merge_command_line_args(&static_args);
        let deployment_props = resolve_deployment_properties(&self.properties);

        Ok(match mode {
            LaunchMode::Platform => LaunchRequest::Platform(PlatformLaunchRequest {
                name,
                args,
                deployment_props,
            }),
            LaunchMode::Standalone => LaunchRequest::Standalone(StandaloneLaunchRequest {
                resource_uri: self.properties.resource_uri().to_string(),
                args,
                environment_props: context.merge_environment_properties(&self.properties),
                deployment_props,
                application_name: name,
            }),
        })
    }

    /// Consumes the inbound message and its launch context; the outbound
    /// message carries the request as JSON and the inbound headers, minus
    /// the context slot.
    pub fn build(&self, ctx: &mut Context, mut message: Message, mode: LaunchMode) -> Result<Message> {
        let task_name = self.task_name()?;
        ctx.log(
            Level::Info,
            format!("creating a task launch request for task {task_name}"),
            Some(json!({ "mode": mode.to_string() })),
        );
        let context = message.take_launch_context();
        let request = self.launch_request(&message, &context, mode)?;

        let mut headers = message.headers;
        headers.remove(LAUNCH_CONTEXT_HEADER);
        headers.insert(
            CONTENT_TYPE.to_string(),
            Value::String(APPLICATION_JSON.to_string()),
        );
        Ok(Message {
            payload: serde_json::to_value(&request)?,
            headers,
            launch_context: None,
        })
    }
}
