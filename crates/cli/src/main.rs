// ABOUTME: CLI for extracting news articles with the newsdesk engines.
// ABOUTME: Extracts one or more URLs (or a saved HTML file) and prints JSON outcomes on stdout.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use newsdesk_engines::{
    load_builtin_registry, load_registry_from_path, EngineRegistry, ExtractError, ExtractionOutcome,
    Pipeline,
};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Extract articles from supported news sites and output JSON.
#[derive(Parser, Debug)]
#[command(name = "newsdesk")]
#[command(about = "Extract news articles with per-site engines and print JSON outcomes", long_about = None)]
struct Args {
    /// Article URLs to extract
    #[arg()]
    urls: Vec<String>,

    /// Engine definitions file (JSON array). Defaults to the builtin engines.
    #[arg(long, env = "NEWSDESK_ENGINES")]
    engines: Option<PathBuf>,

    /// Page-load timeout in seconds
    #[arg(long, env = "NEWSDESK_TIMEOUT_SECS", default_value_t = 60)]
    timeout: u64,

    /// Pause after page load, in milliseconds, before reading the page
    #[arg(long, default_value_t = 0)]
    settle_ms: u64,

    /// Cancel any single extraction that runs longer than this many seconds
    #[arg(long, env = "NEWSDESK_DEADLINE_SECS")]
    deadline: Option<u64>,

    /// Maximum number of extractions in flight
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Attempts per URL for fetch failures and timeouts
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// HTML file to extract (requires --url)
    #[arg(long)]
    html: Option<PathBuf>,

    /// URL context for HTML file extraction (required with --html)
    #[arg(long)]
    url: Option<String>,

    /// Allow fetching from private/local networks
    #[arg(long)]
    allow_private_networks: bool,

    /// Print the registered domains and exit
    #[arg(long)]
    list_engines: bool,

    /// Output compact JSON instead of pretty.
    #[arg(long, default_value_t = false)]
    compact: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(path: Option<&PathBuf>) -> Result<EngineRegistry> {
    match path {
        Some(path) => load_registry_from_path(path)
            .with_context(|| format!("loading engines from {}", path.display())),
        None => load_builtin_registry().context("loading builtin engines"),
    }
}

fn outcome_json(outcome: &ExtractionOutcome) -> Result<Value> {
    Ok(serde_json::to_value(outcome)?)
}

fn error_json(url: &str, err: &ExtractError) -> Value {
    json!({
        "status": "error",
        "url": url,
        "code": err.code.to_string(),
        "error": err.to_string(),
    })
}

fn print_json(value: &Value, compact: bool) -> Result<()> {
    let out = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let args = Args::parse();
    debug!(?args, "parsed arguments");

    if args.html.is_some() && args.url.is_none() {
        bail!("--url is required when using --html");
    }
    if args.html.is_some() && !args.urls.is_empty() {
        bail!("cannot use both --html and positional URLs");
    }

    let registry = load_registry(args.engines.as_ref())?;

    if args.list_engines {
        let engines: Vec<Value> = registry
            .engines()
            .iter()
            .map(|e| json!({ "name": e.name(), "domains": e.domains() }))
            .collect();
        print_json(&Value::Array(engines), args.compact)?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.html.is_none() && args.urls.is_empty() {
        bail!("at least one URL is required, or use --html with --url");
    }

    let mut builder = Pipeline::builder()
        .registry(registry)
        .page_load_timeout(Duration::from_secs(args.timeout))
        .settle(Duration::from_millis(args.settle_ms))
        .max_attempts(args.attempts)
        .allow_private_networks(args.allow_private_networks);
    if let Some(secs) = args.deadline {
        builder = builder.deadline(Duration::from_secs(secs));
    }
    let pipeline = Arc::new(builder.build()?);

    if let (Some(html_path), Some(url)) = (&args.html, &args.url) {
        let html = fs::read_to_string(html_path)
            .with_context(|| format!("reading {}", html_path.display()))?;
        return match pipeline.extract_html(&html, url) {
            Ok(outcome) => {
                print_json(&outcome_json(&outcome)?, args.compact)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                print_json(&error_json(url, &err), args.compact)?;
                Ok(ExitCode::from(1))
            }
        };
    }

    info!(urls = args.urls.len(), concurrency = args.concurrency, "extracting");
    let mut results: Vec<(usize, String, Result<ExtractionOutcome, ExtractError>)> =
        stream::iter(args.urls.iter().cloned().enumerate())
            .map(|(idx, url)| {
                let pipeline = Arc::clone(&pipeline);
                async move {
                    let result = pipeline.extract_with_retry(&url).await;
                    (idx, url, result)
                }
            })
            .buffer_unordered(args.concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(idx, _, _)| *idx);

    let mut had_error = false;
    let mut values = Vec::with_capacity(results.len());
    for (_, url, result) in &results {
        match result {
            Ok(outcome) => values.push(outcome_json(outcome)?),
            Err(err) => {
                had_error = true;
                values.push(error_json(url, err));
            }
        }
    }

    if values.len() == 1 {
        print_json(&values[0], args.compact)?;
    } else {
        print_json(&Value::Array(values), args.compact)?;
    }

    Ok(if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
