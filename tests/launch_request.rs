use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{json, Value};

use stream_app_kernel::config::task::{
    DATASOURCE_PASSWORD_PROPERTY_KEY, DATASOURCE_URL_PROPERTY_KEY,
    DATASOURCE_USERNAME_PROPERTY_KEY,
};
use stream_app_kernel::config::{PropertySource, TaskLaunchRequestProperties};
use stream_app_kernel::message::{APPLICATION_JSON, LAUNCH_CONTEXT_HEADER};
use stream_app_kernel::tasklaunch::{
    LaunchMode, LaunchRequest, LaunchRequestBuilder, LaunchRequestContext, PlatformLaunchRequest,
    StandaloneLaunchRequest,
};
use stream_app_kernel::{register_builtins, ConfigurationError, Context, Message, Registry};

fn sorted(values: &Value) -> Vec<String> {
    let mut items: Vec<String> = values
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    items.sort();
    items
}

#[test]
fn minimal_platform_request_has_empty_collections() -> Result<()> {
    let builder =
        LaunchRequestBuilder::new(TaskLaunchRequestProperties::default().with_task_name("foo"))?;
    let mut ctx = Registry::new().context();
    let out = builder.build(&mut ctx, Message::new(json!("ignored")), LaunchMode::Platform)?;
    assert_eq!(
        out.payload,
        json!({ "name": "foo", "args": [], "deploymentProps": {} })
    );
    assert_eq!(out.content_type(), Some(APPLICATION_JSON));
    Ok(())
}

#[test]
fn static_args_and_deployment_properties_are_carried() -> Result<()> {
    let props = TaskLaunchRequestProperties::default()
        .with_task_name("foo")
        .with_args(["foo=bar", "baz=boo"])
        .with_deployment_properties("count=3");
    let builder = LaunchRequestBuilder::new(props)?;
    let mut ctx = Registry::new().context();
    let out = builder.build(&mut ctx, Message::new(Value::Null), LaunchMode::Platform)?;
    assert_eq!(sorted(&out.payload["args"]), vec!["baz=boo", "foo=bar"]);
    assert_eq!(out.payload["deploymentProps"], json!({ "count": "3" }));
    Ok(())
}

#[test]
fn descriptors_survive_a_json_round_trip() -> Result<()> {
    let platform = LaunchRequest::Platform(PlatformLaunchRequest {
        name: "foo".to_string(),
        args: vec!["a=1".to_string()],
        deployment_props: BTreeMap::from([("count".to_string(), "3".to_string())]),
    });
    let standalone = LaunchRequest::Standalone(StandaloneLaunchRequest {
        resource_uri: "maven://org.example:task:1.0".to_string(),
        args: Vec::new(),
        environment_props: BTreeMap::from([("k".to_string(), "v".to_string())]),
        deployment_props: BTreeMap::new(),
        application_name: "task".to_string(),
    });
    for request in [platform, standalone] {
        let encoded = serde_json::to_string(&request)?;
        let decoded: LaunchRequest = serde_json::from_str(&encoded)?;
        assert_eq!(decoded, request);
    }
    let encoded = serde_json::to_value(LaunchRequest::Standalone(StandaloneLaunchRequest {
        resource_uri: "file:///task.jar".to_string(),
        args: Vec::new(),
        environment_props: BTreeMap::new(),
        deployment_props: BTreeMap::new(),
        application_name: "task".to_string(),
    }))?;
    let mut keys: Vec<&str> = encoded
        .as_object()
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "applicationName",
            "args",
            "deploymentProps",
            "environmentProps",
            "resourceUri"
        ]
    );
    Ok(())
}

#[test]
fn standalone_request_merges_environment() -> Result<()> {
    let props = TaskLaunchRequestProperties::default()
        .with_task_name("timestamp-task")
        .with_resource_uri("maven://org.example:timestamp-task:1.0")
        .with_environment_properties("spring.datasource.url=jdbc:postgresql://db/tasks,extra=1")
        .with_data_source_password("secret");
    let builder = LaunchRequestBuilder::new(props)?;

    let mut context = LaunchRequestContext::new();
    context.add_environment_variable(DATASOURCE_USERNAME_PROPERTY_KEY, "upstream");
    context.add_command_line_arg("localFilePath=/tmp/in.csv");
    let message = Message::new(json!({ "file": "in.csv" })).with_launch_context(context);

    let mut ctx = Registry::new().context();
    let out = builder.build(&mut ctx, message, LaunchMode::Standalone)?;
    let request: StandaloneLaunchRequest = serde_json::from_value(out.payload)?;
    assert_eq!(request.application_name, "timestamp-task");
    assert_eq!(request.resource_uri, "maven://org.example:timestamp-task:1.0");
    assert_eq!(request.args, vec!["localFilePath=/tmp/in.csv"]);
    assert_eq!(
        request.environment_props.get(DATASOURCE_URL_PROPERTY_KEY).map(String::as_str),
        Some("jdbc:postgresql://db/tasks")
    );
    assert_eq!(
        request.environment_props.get(DATASOURCE_USERNAME_PROPERTY_KEY).map(String::as_str),
        Some("upstream")
    );
    assert_eq!(
        request.environment_props.get(DATASOURCE_PASSWORD_PROPERTY_KEY).map(String::as_str),
        Some("secret")
    );
    assert_eq!(request.environment_props.get("extra").map(String::as_str), Some("1"));
    Ok(())
}

#[test]
fn inbound_headers_are_kept_and_context_is_dropped() -> Result<()> {
    let builder =
        LaunchRequestBuilder::new(TaskLaunchRequestProperties::default().with_task_name("foo"))?;
    let inbound = Message::from_json(json!({
        "headers": {
            "id": "m-7",
            "contentType": "text/plain",
            "taskLaunchRequestContext": { "commandLineArgs": ["x=1"] }
        },
        "payload": "hello"
    }))?;
    let mut ctx = Registry::new().context();
    let out = builder.build(&mut ctx, inbound, LaunchMode::Platform)?;
    assert_eq!(out.header("id"), Some(&json!("m-7")));
    assert_eq!(out.content_type(), Some(APPLICATION_JSON));
    assert!(out.header(LAUNCH_CONTEXT_HEADER).is_none());
    assert!(out.launch_context.is_none());
    assert_eq!(out.payload["args"], json!(["x=1"]));

    let wire = out.to_json()?;
    assert!(wire["headers"].get(LAUNCH_CONTEXT_HEADER).is_none());
    Ok(())
}

#[test]
fn blank_task_name_is_a_configuration_error() -> Result<()> {
    let builder =
        LaunchRequestBuilder::new(TaskLaunchRequestProperties::default().with_task_name("  "))?;
    let mut ctx = Registry::new().context();
    let err = builder
        .build(&mut ctx, Message::new(Value::Null), LaunchMode::Standalone)
        .expect_err("a blank task name must be rejected");
    assert!(err.is::<ConfigurationError>());
    Ok(())
}

#[test]
fn composed_definition_feeds_upstream_context_into_the_builder() -> Result<()> {
    let source = PropertySource::new()
        .with("task.launch.request.task-name", "ingest")
        .with("task.launch.request.args", "mode=batch")
        .with("task.launch.request.arg-expressions", "file=payload.path");
    let registry = Registry::new();
    register_builtins(&registry, &source)?;
    registry.register_function(
        "enrich",
        |_ctx: &mut Context, mut message: Message| -> Result<Message> {
            let mut context = message.take_launch_context();
            context.add_command_line_arg("source=sftp");
            Ok(message.with_launch_context(context))
        },
    );

    let invoker = registry.resolve("enrich|dataflowTaskLaunchRequest")?;
    let out = invoker.apply(
        &mut registry.context(),
        Message::new(json!({ "path": "/data/in.csv" })),
    )?;
    assert_eq!(out.payload["name"], json!("ingest"));
    assert_eq!(
        sorted(&out.payload["args"]),
        vec!["file=/data/in.csv", "mode=batch", "source=sftp"]
    );
    Ok(())
}

#[test]
fn generic_function_follows_the_definition() -> Result<()> {
    let plain = PropertySource::new()
        .with("task.launch.request.task-name", "foo")
        .with("function.definition", "taskLaunchRequest");
    let registry = Registry::new();
    register_builtins(&registry, &plain)?;
    let out = registry
        .resolve("taskLaunchRequest")?
        .apply(&mut registry.context(), Message::new(json!("untouched")))?;
    assert_eq!(out.payload, json!("untouched"));

    let standalone = plain
        .clone()
        .with("function.definition", "taskLaunchRequest|standaloneTaskLaunchRequest");
    let registry = Registry::new();
    register_builtins(&registry, &standalone)?;
    let out = registry
        .resolve("taskLaunchRequest")?
        .apply(&mut registry.context(), Message::new(json!("x")))?;
    assert_eq!(out.payload["applicationName"], json!("foo"));
    Ok(())
}
