use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::json;
use stream_app_kernel::config::function::FUNCTION_DEFINITION_OPTION;
use stream_app_kernel::config::{FunctionProperties, PropertySource, TriggerProperties};
use stream_app_kernel::logging::Level;
use stream_app_kernel::registry::{CancelledError, Context, InvocationKind, Invoker, Registry};
use stream_app_kernel::trigger::{self, Poller};
use stream_app_kernel::{register_builtins, Message};

#[derive(Parser, Debug)]
#[command(name = "stream-app")]
#[command(about = "Run a function definition over JSON-lines messages or on a trigger")]
struct CliOptions {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// JSON-lines input file (use '-' for stdin)
    #[arg(long = "input", short = 'i', default_value = "-")]
    input: String,

    /// JSON-lines output file (use '-' for stdout)
    #[arg(long = "output", short = 'o', default_value = "-")]
    output: String,

    /// Property override, repeatable (key=value)
    #[arg(short = 'D', long = "property", value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// Function definition, e.g. `timeSource|logSink`
    #[arg(long = "definition", short = 'd')]
    definition: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();

    let mut overrides = PropertySource::from_args(&opts.properties)?;
    if let Some(definition) = &opts.definition {
        overrides.set(FUNCTION_DEFINITION_OPTION, definition.clone());
    }
    let source = PropertySource::layered(
        opts.config.as_deref(),
        PropertySource::from_env(),
        overrides,
    )?;

    let registry = Registry::new();
    if let Some(raw) = source.get_text(&["logging.level"]) {
        registry.set_log_level(raw.parse::<Level>()?);
    }
    register_builtins(&registry, &source)?;

    let function = FunctionProperties::from_source(&source);
    let invoker = registry.resolve(function.definition())?;

    let cancellation = Arc::new(AtomicBool::new(false));
    let handler_token = cancellation.clone();
    ctrlc::set_handler(move || handler_token.store(true, Ordering::SeqCst))
        .context("Unable to install Ctrl+C handler")?;
    let mut ctx = registry.context_with_cancellation(cancellation);

    let mut output = open_output(&opts.output)?;
    ctx.log(
        Level::Info,
        format!("running `{}`", invoker.definition()),
        Some(json!({ "kind": invoker.kind().to_string() })),
    );

    match invoker.kind() {
        InvocationKind::Supplier => {
            run_poller(&mut ctx, &invoker, &source, &mut output)?;
        }
        InvocationKind::Function | InvocationKind::Consumer => {
            let input = open_input(&opts.input)?;
            run_stream(&mut ctx, &invoker, input, &mut output)?;
        }
    }
    output.flush()?;
    Ok(())
}

fn run_poller(
    ctx: &mut Context,
    invoker: &Invoker,
    source: &PropertySource,
    output: &mut dyn Write,
) -> Result<()> {
    let selection = trigger::select(&TriggerProperties::from_source(source)?)?;
    let summary = Poller::new(selection).run(
        ctx,
        |ctx| invoker.supply(ctx),
        |ctx, message| {
            if let Some(out) = invoker.process(ctx, message)? {
                write_message(output, &out)?;
            }
            Ok(())
        },
    )?;
    ctx.log(
        Level::Info,
        "poller stopped",
        Some(json!({
            "ticks": summary.ticks,
            "delivered": summary.delivered,
            "failed": summary.failed,
        })),
    );
    Ok(())
}

fn run_stream(
    ctx: &mut Context,
    invoker: &Invoker,
    input: Box<dyn BufRead>,
    output: &mut dyn Write,
) -> Result<()> {
    for (idx, line) in input.lines().enumerate() {
        if ctx.is_cancelled() {
            break;
        }
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let result = Message::from_line(&line).and_then(|message| invoker.process(ctx, message));
        match result {
            Ok(Some(out)) => write_message(output, &out)?,
            Ok(None) => {}
            Err(err) if err.is::<CancelledError>() => break,
            Err(err) => ctx.log(
                Level::Error,
                "message handling failed",
                Some(json!({ "line": idx + 1, "error": format!("{err:#}") })),
            ),
        }
    }
    Ok(())
}

fn write_message(output: &mut dyn Write, message: &Message) -> Result<()> {
    let encoded = serde_json::to_string(&message.to_json()?)?;
    writeln!(output, "{encoded}")?;
    output.flush()?;
    Ok(())
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Unable to read {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(path).with_context(|| format!("Unable to create {path}"))?;
    Ok(Box::new(BufWriter::new(file)))
}
