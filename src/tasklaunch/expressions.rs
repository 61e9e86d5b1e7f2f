use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use quick_js::{Context as JsContext, JsValue};
use serde_json::{Map, Value};

use crate::errors::{EvaluationError, ExpressionError};
use crate::message::Message;

static NEXT_EVALUATOR_ID: AtomicU64 = AtomicU64::new(1);
// Ids of compiled sets not yet dropped. Engines cached under any other id are
// stale and get evicted the next time their thread installs an engine.
static LIVE_SETS: Mutex<BTreeSet<u64>> = Mutex::new(BTreeSet::new());

thread_local! {
    // A JS context is not Send, so compiled expressions live per worker thread.
    static ENGINES: RefCell<HashMap<u64, JsContext>> = RefCell::new(HashMap::new());
}

#[derive(Debug, Clone)]
struct CompiledExpression {
    name: String,
    function: String,
}

#[derive(Debug)]
struct CompiledSet {
    id: u64,
    expressions: Vec<CompiledExpression>,
    script: String,
}

fn live_sets() -> std::sync::MutexGuard<'static, BTreeSet<u64>> {
    LIVE_SETS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dropping a set releases its engine on the dropping thread right away;
/// other threads release theirs on their next install.
impl Drop for CompiledSet {
    fn drop(&mut self) {
        live_sets().remove(&self.id);
        let _ = ENGINES.try_with(|engines| {
            if let Ok(mut engines) = engines.try_borrow_mut() {
                engines.remove(&self.id);
            }
        });
    }
}

/// Evaluates `name=template` argument expressions against a message payload.
/// Templates are JavaScript expressions with the payload bound to `payload`.
/// Cloning is cheap and clones share the compiled form.
#[derive(Debug, Clone)]
pub struct ArgExpressionEvaluator {
    compiled: Arc<CompiledSet>,
}

impl ArgExpressionEvaluator {
    /// Compiles every template up front; a syntax error is an
    /// [`ExpressionError`].
    pub fn compile(expressions: &[(String, String)]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(expressions.len());
        let mut script = String::new();
        for (idx, (name, template)) in expressions.iter().enumerate() {
            if template.trim().is_empty() {
                return Err(ExpressionError {
                    name: name.clone(),
                    template: template.clone(),
                    reason: "expression is empty".to_string(),
                }
                .into());
            }
            let function = format!("__arg_{idx}");
            // The closing paren sits on its own line so a trailing `//` comment
            // in the template cannot swallow it.
            let source = format!("function {function}(payload) {{\n  return ({template}\n  );\n}}\n");
            check_syntax(&source).map_err(|reason| ExpressionError {
                name: name.clone(),
                template: template.clone(),
                reason,
            })?;
            script.push_str(&source);
            compiled.push(CompiledExpression {
                name: name.clone(),
                function,
            });
        }
        let id = NEXT_EVALUATOR_ID.fetch_add(1, Ordering::Relaxed);
        live_sets().insert(id);
        Ok(Self {
            compiled: Arc::new(CompiledSet {
                id,
                expressions: compiled,
                script,
            }),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.expressions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compiled.expressions.iter().map(|expr| expr.name.as_str())
    }

    /// One `name=value` string per expression, in configuration order.
    pub fn evaluate(&self, message: &Message) -> Result<Vec<String>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let set = &self.compiled;
        ENGINES.with(|engines| -> Result<Vec<String>> {
            let mut engines = engines.borrow_mut();
            if !engines.contains_key(&set.id) {
                let engine = install(&set.script)?;
                let live = live_sets();
                engines.retain(|id, _| live.contains(id));
                drop(live);
                engines.insert(set.id, engine);
            }
            let engine = engines
                .get(&set.id)
                .ok_or_else(|| anyhow!("expression engine missing after install"))?;
            let mut args = Vec::with_capacity(set.expressions.len());
            for expr in &set.expressions {
                let payload = json_to_js_value(&message.payload);
                let value = engine
                    .call_function(&expr.function, vec![payload])
                    .map_err(|err| EvaluationError {
                        name: expr.name.clone(),
                        reason: err.to_string(),
                    })?;
                args.push(format!("{}={}", expr.name, format_js_value(value)));
            }
            Ok(args)
        })
    }
}

fn check_syntax(source: &str) -> std::result::Result<(), String> {
    let scratch = JsContext::new().map_err(|err| err.to_string())?;
    scratch.eval(source).map(|_| ()).map_err(|err| err.to_string())
}

fn install(script: &str) -> Result<JsContext> {
    let engine =
        JsContext::new().map_err(|err| anyhow!("unable to create expression engine: {err}"))?;
    engine
        .eval(script)
        .map_err(|err| anyhow!("failed to load compiled expressions: {err}"))?;
    Ok(engine)
}

fn json_to_js_value(value: &Value) -> JsValue {
    match value {
        Value::Null => JsValue::Null,
        Value::Bool(b) => JsValue::Bool(*b),
        Value::Number(num) => {
            if let Some(int_val) = num.as_i64() {
                if let Ok(as_i32) = i32::try_from(int_val) {
                    return JsValue::Int(as_i32);
                }
                return JsValue::Float(int_val as f64);
            }
            num.as_f64().map(JsValue::Float).unwrap_or(JsValue::Null)
        }
        Value::String(s) => JsValue::String(s.clone()),
        Value::Array(items) => JsValue::Array(items.iter().map(json_to_js_value).collect()),
        Value::Object(map) => JsValue::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), json_to_js_value(val)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

fn js_value_to_json(value: JsValue) -> Value {
    match value {
        JsValue::Bool(b) => Value::Bool(b),
        JsValue::Int(n) => Value::Number(n.into()),
        JsValue::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        JsValue::String(s) => Value::String(s),
        JsValue::Array(items) => Value::Array(items.into_iter().map(js_value_to_json).collect()),
        JsValue::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, val)| (key, js_value_to_json(val)))
                .collect::<Map<_, _>>(),
        ),
        _ => Value::Null,
    }
}

fn format_js_value(value: JsValue) -> String {
    match value {
        JsValue::Undefined | JsValue::Null => "null".to_string(),
        JsValue::Bool(b) => b.to_string(),
        JsValue::Int(n) => n.to_string(),
        JsValue::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        JsValue::String(s) => s,
        other => serde_json::to_string(&js_value_to_json(other))
            .unwrap_or_else(|_| "[object]".to_string()),
    }
}

#[cfg(test)]
fn cached_engines() -> usize {
    ENGINES.with(|engines| engines.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn stringifies_numbers_and_objects() {
        let evaluator = ArgExpressionEvaluator::compile(&pairs(&[
            ("len", "payload.name.length"),
            ("half", "payload.count / 2"),
            ("tags", "payload.tags"),
            ("missing", "payload.nothing"),
        ]))
        .unwrap();
        let message = Message::new(json!({ "name": "abc", "count": 5, "tags": ["x"] }));
        assert_eq!(
            evaluator.evaluate(&message).unwrap(),
            vec!["len=3", "half=2.5", "tags=[\"x\"]", "missing=null"]
        );
    }

    #[test]
    fn empty_template_is_rejected() {
        let err = ArgExpressionEvaluator::compile(&pairs(&[("a", "  ")])).unwrap_err();
        assert!(err.is::<ExpressionError>());
    }

    #[test]
    fn no_expressions_skip_the_engine() {
        let evaluator = ArgExpressionEvaluator::compile(&[]).unwrap();
        assert!(evaluator.is_empty());
        assert!(evaluator.evaluate(&Message::new(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn engines_of_sets_dropped_elsewhere_are_evicted() {
        let first = ArgExpressionEvaluator::compile(&pairs(&[("a", "payload")])).unwrap();
        first.evaluate(&Message::new(json!(1))).unwrap();
        assert_eq!(cached_engines(), 1);

        thread::spawn(move || drop(first)).join().unwrap();
        assert_eq!(cached_engines(), 1);

        let second = ArgExpressionEvaluator::compile(&pairs(&[("b", "payload + 1")])).unwrap();
        assert_eq!(second.evaluate(&Message::new(json!(1))).unwrap(), vec!["b=2"]);
        assert_eq!(cached_engines(), 1);
    }

    #[test]
    fn trailing_line_comment_in_a_template() {
        let evaluator =
            ArgExpressionEvaluator::compile(&pairs(&[("n", "payload * 2 // doubled")])).unwrap();
        assert_eq!(evaluator.evaluate(&Message::new(json!(4))).unwrap(), vec!["n=8"]);
    }
}
