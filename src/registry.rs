use std::collections::HashMap;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::errors::ConfigurationError;
use crate::logging::{self, Level, LogSink};
use crate::message::Message;

#[derive(Debug)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution cancelled")
    }
}

impl std::error::Error for CancelledError {}

/// A single-argument transform.
pub trait Function: Send + Sync {
    fn apply(&self, ctx: &mut Context, message: Message) -> Result<Message>;
}

impl<F> Function for F
where
    F: Fn(&mut Context, Message) -> Result<Message> + Send + Sync + 'static,
{
    fn apply(&self, ctx: &mut Context, message: Message) -> Result<Message> {
        (self)(ctx, message)
    }
}

/// A side-effecting sink action.
pub trait Consumer: Send + Sync {
    fn accept(&self, ctx: &mut Context, message: Message) -> Result<()>;
}

impl<F> Consumer for F
where
    F: Fn(&mut Context, Message) -> Result<()> + Send + Sync + 'static,
{
    fn accept(&self, ctx: &mut Context, message: Message) -> Result<()> {
        (self)(ctx, message)
    }
}

/// A value-producing source. `None` means nothing is available right now.
pub trait Supplier: Send + Sync {
    fn supply(&self, ctx: &mut Context) -> Result<Option<Message>>;
}

impl<F> Supplier for F
where
    F: Fn(&mut Context) -> Result<Option<Message>> + Send + Sync + 'static,
{
    fn supply(&self, ctx: &mut Context) -> Result<Option<Message>> {
        (self)(ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Function,
    Consumer,
    Supplier,
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationKind::Function => "function",
            InvocationKind::Consumer => "consumer",
            InvocationKind::Supplier => "supplier",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
enum Unit {
    Function(Arc<dyn Function>),
    Consumer(Arc<dyn Consumer>),
    Supplier(Arc<dyn Supplier>),
}

impl Unit {
    fn kind(&self) -> InvocationKind {
        match self {
            Unit::Function(_) => InvocationKind::Function,
            Unit::Consumer(_) => InvocationKind::Consumer,
            Unit::Supplier(_) => InvocationKind::Supplier,
        }
    }
}

struct RegistryInner {
    units: HashMap<String, Unit>,
    log_sink: Option<Arc<dyn LogSink>>,
    log_level: Level,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            units: HashMap::new(),
            log_sink: None,
            log_level: Level::Info,
        }
    }
}

/// Named units the host application declares explicitly. Cloning shares the
/// underlying table.
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::new())),
        }
    }

    pub fn register_function<F>(&self, name: impl Into<String>, func: F)
    where
        F: Function + 'static,
    {
        self.register_unit(name, Unit::Function(Arc::new(func)));
    }

    pub fn register_consumer<F>(&self, name: impl Into<String>, consumer: F)
    where
        F: Consumer + 'static,
    {
        self.register_unit(name, Unit::Consumer(Arc::new(consumer)));
    }

    pub fn register_supplier<F>(&self, name: impl Into<String>, supplier: F)
    where
        F: Supplier + 'static,
    {
        self.register_unit(name, Unit::Supplier(Arc::new(supplier)));
    }

    fn register_unit(&self, name: impl Into<String>, unit: Unit) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.units.insert(name.into(), unit);
    }

    pub fn set_log_sink<S>(&self, sink: S)
    where
        S: LogSink + 'static,
    {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.log_sink = Some(Arc::new(sink));
    }

    pub fn set_log_level(&self, level: Level) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.log_level = level;
    }

    pub fn context(&self) -> Context {
        Context::new(self.inner.clone(), Arc::new(AtomicBool::new(false)))
    }

    pub fn context_with_cancellation(&self, token: Arc<AtomicBool>) -> Context {
        Context::new(self.inner.clone(), token)
    }

    /// Resolves a `|`-separated definition into an invoker. With no
    /// definition the only registered unit is used.
    pub fn resolve(&self, definition: &str) -> Result<Invoker> {
        let inner = self.inner.lock().expect("registry poisoned");
        let names: Vec<String> = if definition.trim().is_empty() {
            let mut registered: Vec<&String> = inner.units.keys().collect();
            if registered.len() != 1 {
                registered.sort();
                return Err(ConfigurationError::new(format!(
                    "function.definition is required when {} units are registered ({})",
                    registered.len(),
                    registered
                        .iter()
                        .map(|name| name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
                .into());
            }
            vec![registered[0].clone()]
        } else {
            definition
                .split('|')
                .map(|name| name.trim().to_string())
                .collect()
        };

        let last = names.len() - 1;
        let mut invoker = Invoker {
            definition: names.join("|"),
            source: None,
            functions: Vec::new(),
            sink: None,
        };
        for (idx, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(ConfigurationError::new(format!(
                    "empty name in function.definition `{definition}`"
                ))
                .into());
            }
            let unit = inner.units.get(name).ok_or_else(|| {
                ConfigurationError::new(format!(
                    "no function, consumer or supplier registered as `{name}`"
                ))
            })?;
            match unit {
                Unit::Supplier(supplier) if idx == 0 => {
                    invoker.source = Some((name.clone(), supplier.clone()));
                }
                Unit::Consumer(consumer) if idx == last => {
                    invoker.sink = Some((name.clone(), consumer.clone()));
                }
                Unit::Function(func) => invoker.functions.push((name.clone(), func.clone())),
                other => {
                    return Err(ConfigurationError::new(format!(
                        "{} `{name}` cannot appear at position {} of `{definition}`",
                        other.kind(),
                        idx + 1
                    ))
                    .into())
                }
            }
        }
        Ok(invoker)
    }
}

/// A resolved definition: an optional supplier, any number of functions and
/// an optional consumer, run in that order.
#[derive(Clone)]
pub struct Invoker {
    definition: String,
    source: Option<(String, Arc<dyn Supplier>)>,
    functions: Vec<(String, Arc<dyn Function>)>,
    sink: Option<(String, Arc<dyn Consumer>)>,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("definition", &self.definition)
            .field("kind", &self.kind())
            .finish()
    }
}

impl Invoker {
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn kind(&self) -> InvocationKind {
        if self.source.is_some() {
            InvocationKind::Supplier
        } else if self.sink.is_some() {
            InvocationKind::Consumer
        } else {
            InvocationKind::Function
        }
    }

    /// Pulls one message from the supplier; `None` when it has nothing.
    pub fn supply(&self, ctx: &mut Context) -> Result<Option<Message>> {
        let (name, supplier) = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("`{}` does not start with a supplier", self.definition))?;
        ctx.ensure_not_cancelled()?;
        with_unit_tags(ctx, name, |ctx| supplier.supply(ctx))
    }

    /// Runs the functions and, when present, the consumer. Returns the
    /// outbound message unless a consumer took it.
    pub fn process(&self, ctx: &mut Context, message: Message) -> Result<Option<Message>> {
        let mut current = message;
        for (name, func) in &self.functions {
            ctx.ensure_not_cancelled()?;
            current = with_unit_tags(ctx, name, |ctx| func.apply(ctx, current))?;
        }
        match &self.sink {
            Some((name, consumer)) => {
                ctx.ensure_not_cancelled()?;
                with_unit_tags(ctx, name, |ctx| consumer.accept(ctx, current))?;
                Ok(None)
            }
            None => Ok(Some(current)),
        }
    }

    /// Function-shaped invocation: the chain must not end in a consumer.
    pub fn apply(&self, ctx: &mut Context, message: Message) -> Result<Message> {
        if let Some((name, _)) = &self.sink {
            return Err(anyhow!("`{}` ends with consumer `{name}`", self.definition));
        }
        self.process(ctx, message)?
            .ok_or_else(|| anyhow!("`{}` produced no message", self.definition))
    }

    /// Consumer-shaped invocation: the chain must end in a consumer.
    pub fn accept(&self, ctx: &mut Context, message: Message) -> Result<()> {
        if self.sink.is_none() {
            return Err(anyhow!("`{}` does not end with a consumer", self.definition));
        }
        self.process(ctx, message).map(|_| ())
    }

    /// Supplier output pushed through the rest of the chain.
    pub fn poll(&self, ctx: &mut Context) -> Result<Option<Message>> {
        match self.supply(ctx)? {
            Some(message) => self.process(ctx, message),
            None => Ok(None),
        }
    }
}

fn with_unit_tags<T>(
    ctx: &mut Context,
    name: &str,
    call: impl FnOnce(&mut Context) -> Result<T>,
) -> Result<T> {
    let mut tags = Map::new();
    tags.insert("function".to_string(), Value::String(name.to_string()));
    ctx.push_log_tags(tags);
    let result = call(ctx);
    ctx.pop_log_tags();
    result
}

/// Per-invocation state: cancellation and log scope. Never shared between
/// concurrently processed messages.
pub struct Context {
    registry: Arc<Mutex<RegistryInner>>,
    log_tag_stack: Vec<Map<String, Value>>,
    cancellation: Arc<AtomicBool>,
}

impl Context {
    fn new(registry: Arc<Mutex<RegistryInner>>, cancellation: Arc<AtomicBool>) -> Self {
        Self {
            registry,
            log_tag_stack: Vec::new(),
            cancellation,
        }
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::SeqCst)
    }

    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CancelledError.into())
        } else {
            Ok(())
        }
    }

    pub fn push_log_tags(&mut self, tags: Map<String, Value>) {
        let tags = logging::stable_tags(tags);
        if tags.is_empty() {
            return;
        }
        self.log_tag_stack.push(tags);
    }

    pub fn pop_log_tags(&mut self) {
        self.log_tag_stack.pop();
    }

    pub fn log(&self, level: Level, message: impl Into<String>, data: Option<Value>) {
        let (sink, threshold) = {
            let inner = self.registry.lock().expect("registry poisoned");
            (inner.log_sink.clone(), inner.log_level)
        };
        if level < threshold {
            return;
        }
        let mut tags = Map::new();
        for scope in &self.log_tag_stack {
            for (k, v) in scope {
                tags.insert(k.clone(), v.clone());
            }
        }
        let entry = logging::build_entry(level, message.into(), data, tags);
        match sink {
            Some(sink) => sink.write(&entry),
            None => logging::write_fallback(&entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper(_ctx: &mut Context, message: Message) -> Result<Message> {
        let text = message.payload.as_str().unwrap_or_default().to_uppercase();
        Ok(Message::new(json!(text)))
    }

    #[test]
    fn single_unit_is_selected_without_definition() {
        let registry = Registry::new();
        registry.register_function("upper", upper);
        let invoker = registry.resolve("").unwrap();
        assert_eq!(invoker.kind(), InvocationKind::Function);
        assert_eq!(invoker.definition(), "upper");
    }

    #[test]
    fn ambiguous_registry_needs_a_definition() {
        let registry = Registry::new();
        registry.register_function("upper", upper);
        registry.register_function("other", upper);
        let err = registry.resolve("  ").unwrap_err();
        assert!(err.is::<ConfigurationError>());
    }

    #[test]
    fn supplier_must_come_first() {
        let registry = Registry::new();
        registry.register_function("upper", upper);
        registry.register_supplier("tick", |_ctx: &mut Context| -> Result<Option<Message>> {
            Ok(None)
        });
        let err = registry.resolve("upper|tick").unwrap_err();
        assert!(err.to_string().contains("supplier `tick`"));
        assert_eq!(
            registry.resolve("tick|upper").unwrap().kind(),
            InvocationKind::Supplier
        );
    }

    #[test]
    fn cancelled_context_stops_processing() {
        let registry = Registry::new();
        registry.register_function("upper", upper);
        let invoker = registry.resolve("upper").unwrap();
        let mut ctx = registry.context();
        ctx.cancel();
        let err = invoker
            .process(&mut ctx, Message::new(json!("x")))
            .unwrap_err();
        assert!(err.is::<CancelledError>());
    }
}
