use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use titlechain_api::{resolve, ResolveRequest};
use titlechain_core::{describe_rules, InstrumentEvent};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "tc")]
#[command(about = "Title chain ownership resolution CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve current ownership for one tract from a file of normalized
    /// instrument events.
    Resolve(ResolveArgs),
    /// Print the classifier decision table in evaluation order.
    Rules,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Path to a JSON array of normalized instrument events.
    #[arg(long)]
    events: PathBuf,
    #[arg(long)]
    tract_key: String,
    #[arg(long, default_value_t = 0.0)]
    total_acres: f64,
    #[arg(long, default_value_t = false)]
    hbp: bool,
    #[arg(long)]
    as_of: Option<String>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Resolve(args) => run_resolve(args),
        Command::Rules => run_rules(),
    }
}

fn run_resolve(args: ResolveArgs) -> Result<()> {
    let body = fs::read_to_string(&args.events)
        .with_context(|| format!("failed to read events file {}", args.events.display()))?;
    let events: Vec<InstrumentEvent> = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse events file {}", args.events.display()))?;

    let result = resolve(ResolveRequest {
        events,
        tract_key: args.tract_key,
        as_of: args.as_of,
        hbp: args.hbp,
        total_acres: args.total_acres,
    })?;

    emit_json(serde_json::to_value(&result).context("failed to serialize resolve result")?)
}

fn run_rules() -> Result<()> {
    emit_json(serde_json::json!({ "rules": describe_rules() }))
}
