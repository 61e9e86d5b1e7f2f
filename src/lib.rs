pub mod apps;
pub mod config;
pub mod errors;
pub mod keyvalue;
pub mod logging;
pub mod message;
pub mod registry;
pub mod tasklaunch;
pub mod trigger;

pub use apps::register_builtins;
pub use errors::{ConfigurationError, EvaluationError, ExpressionError};
pub use message::Message;
pub use registry::{CancelledError, Context, InvocationKind, Invoker, Registry};
pub use tasklaunch::{LaunchMode, LaunchRequestBuilder, LaunchRequestContext, LaunchRequestType};
pub use trigger::{Poller, TriggerSelection, TriggerSpec};
