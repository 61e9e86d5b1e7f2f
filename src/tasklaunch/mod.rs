//! Task launch requests: turning inbound messages into descriptors a task
//! launcher understands.

pub mod builder;
pub mod context;
pub mod deployment;
pub mod expressions;
pub mod request;

pub use builder::LaunchRequestBuilder;
pub use context::LaunchRequestContext;
pub use deployment::resolve_deployment_properties;
pub use expressions::ArgExpressionEvaluator;
pub use request::{
    LaunchMode, LaunchRequest, LaunchRequestType, PlatformLaunchRequest, StandaloneLaunchRequest,
};
