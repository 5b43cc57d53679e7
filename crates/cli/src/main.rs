use std::{fs, io::Read, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use clap::Parser;
use retort_registry::{Retort, SharedContext};
use serde_json::Value;
use tracing::{Level, debug};

/// Execute a GraphQL request against a Retort configuration directory.
#[derive(Parser, Debug)]
#[command(name = "retort", version, about)]
struct Args {
    /// Directory holding `connectors/` and `models/`
    #[arg(long, short = 'c', default_value = ".")]
    config: PathBuf,

    /// GraphQL request text; read from stdin when neither this nor --query-file is given
    #[arg(long, short = 'q', conflicts_with = "query_file")]
    query: Option<String>,

    #[arg(long)]
    query_file: Option<PathBuf>,

    /// Request variables as a JSON object
    #[arg(long)]
    variables: Option<String>,

    #[arg(long)]
    operation_name: Option<String>,

    /// Shared pipeline context entry as KEY=VALUE; VALUE is parsed as JSON and falls back to a string
    #[arg(long = "context", value_parser = parse_context_entry)]
    context: Vec<(String, Value)>,

    /// Fail on the first entity that does not assemble instead of skipping it
    #[arg(long)]
    debug: bool,

    /// Print the assembled schema as SDL and exit
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let args = Args::parse();

    let mut retort = Retort::builder()
        .debug(args.debug)
        .build_from_dir(&args.config)
        .with_context(|| format!("failed to assemble schema from {}", args.config.display()))?;

    if args.print_schema {
        println!("{}", retort.sdl());
        return Ok(ExitCode::SUCCESS);
    }

    let mut shared = SharedContext::default();
    for (key, value) in &args.context {
        shared.insert(key.clone(), value.clone());
    }
    retort.set_shared_pipeline_context(shared);

    let query = read_query(&args)?;
    let variables = args
        .variables
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--variables must be valid JSON")?;
    if let Some(variables) = &variables
        && !variables.is_object()
    {
        bail!("--variables must be a JSON object");
    }

    debug!(config = %args.config.display(), operation = ?args.operation_name, "executing request");
    let result = retort.execute(&query, variables, args.operation_name.as_deref()).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_query(args: &Args) -> Result<String> {
    if let Some(query) = &args.query {
        return Ok(query.clone());
    }
    if let Some(path) = &args.query_file {
        return fs::read_to_string(path).with_context(|| format!("failed to read query file {}", path.display()));
    }
    let mut query = String::new();
    std::io::stdin().read_to_string(&mut query).context("failed to read query from stdin")?;
    if query.trim().is_empty() {
        bail!("no query given; pass --query, --query-file, or pipe one on stdin");
    }
    Ok(query)
}

fn parse_context_entry(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty context key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}
