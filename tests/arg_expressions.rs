use std::thread;

use anyhow::Result;
use serde_json::{json, Value};

use stream_app_kernel::keyvalue;
use stream_app_kernel::tasklaunch::ArgExpressionEvaluator;
use stream_app_kernel::{EvaluationError, ExpressionError, Message};

fn evaluator(raw: &str) -> Result<ArgExpressionEvaluator> {
    ArgExpressionEvaluator::compile(&keyvalue::parse_pairs(raw))
}

#[test]
fn payload_methods_are_available() -> Result<()> {
    let evaluator = evaluator("foo=payload.toUpperCase()")?;
    let args = evaluator.evaluate(&Message::new(json!("hello")))?;
    assert_eq!(args, vec!["foo=HELLO"]);
    Ok(())
}

#[test]
fn templates_may_end_in_a_line_comment() -> Result<()> {
    let evaluator = evaluator("foo=payload.toUpperCase() // upper")?;
    let args = evaluator.evaluate(&Message::new(json!("hello")))?;
    assert_eq!(args, vec!["foo=HELLO"]);
    Ok(())
}

#[test]
fn commas_inside_a_template_stay_with_it() -> Result<()> {
    let evaluator = evaluator("prefix=payload.substring(0,2),upper=payload.toUpperCase()")?;
    let names: Vec<&str> = evaluator.names().collect();
    assert_eq!(names, vec!["prefix", "upper"]);
    let args = evaluator.evaluate(&Message::new(json!("hello")))?;
    assert_eq!(args, vec!["prefix=he", "upper=HELLO"]);
    Ok(())
}

#[test]
fn object_payloads_are_navigable() -> Result<()> {
    let evaluator = evaluator("file=payload.name,size=payload.size * 2,ok=payload.size > 1")?;
    let args = evaluator.evaluate(&Message::new(json!({ "name": "in.csv", "size": 21 })))?;
    assert_eq!(args, vec!["file=in.csv", "size=42", "ok=true"]);
    Ok(())
}

#[test]
fn null_payload_fails_only_that_message() -> Result<()> {
    let evaluator = evaluator("foo=payload.toUpperCase()")?;
    let err = evaluator
        .evaluate(&Message::new(Value::Null))
        .expect_err("calling a method on null must fail");
    assert!(err.is::<EvaluationError>());

    let args = evaluator.evaluate(&Message::new(json!("again")))?;
    assert_eq!(args, vec!["foo=AGAIN"]);
    Ok(())
}

#[test]
fn syntax_errors_surface_at_compile_time() {
    let err = evaluator("foo=payload.(")
        .err()
        .expect("a malformed template must not compile");
    let expression = err
        .downcast_ref::<ExpressionError>()
        .expect("compile failures are expression errors");
    assert_eq!(expression.name, "foo");
    assert_eq!(expression.template, "payload.(");
}

#[test]
fn clones_evaluate_on_other_threads() -> Result<()> {
    let evaluator = evaluator("len=payload.length")?;
    let handles: Vec<_> = ["a", "bb", "ccc"]
        .into_iter()
        .map(|text| {
            let evaluator = evaluator.clone();
            thread::spawn(move || evaluator.evaluate(&Message::new(json!(text))))
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        let args = handle
            .join()
            .map_err(|_| anyhow::anyhow!("evaluation thread panicked"))??;
        results.extend(args);
    }
    assert_eq!(results, vec!["len=1", "len=2", "len=3"]);
    Ok(())
}
