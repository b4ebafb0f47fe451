//! Mocknet CLI
//!
//! Commands:
//!   mocknet inspect <wasm>  - Show a contract's imports, exports and ABI
//!   mocknet run <wasm>      - Instantiate a contract and run messages against it

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mocknet::{AbiAdapter, ContractManifest, InstantiateOptions, Mocknet, MocknetConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mocknet")]
#[command(about = "Run and inspect WASM contracts on a local in-memory chain", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a contract binary without running it
    Inspect {
        /// Path to the WASM file
        wasm_file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Instantiate a contract, then run executes and queries in order
    Run {
        /// Path to the WASM file
        wasm_file: PathBuf,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// ABI generation (v0 or v1); detected from the exports when omitted
        #[arg(long)]
        abi: Option<AbiAdapter>,

        /// Sender of every message
        #[arg(long, default_value = "admin")]
        sender: String,

        /// Label of the contract
        #[arg(long, default_value = "mocknet")]
        label: String,

        /// Instantiate message (JSON)
        #[arg(long)]
        init: String,

        /// Execute message (JSON), repeatable
        #[arg(long)]
        execute: Vec<String>,

        /// Query message (JSON), repeatable; runs after all executes
        #[arg(long)]
        query: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { wasm_file, json } => inspect_command(&wasm_file, json),
        Commands::Run {
            wasm_file,
            config,
            abi,
            sender,
            label,
            init,
            execute,
            query,
        } => run_command(RunArgs {
            wasm_file,
            config,
            abi,
            sender,
            label,
            init,
            execute,
            query,
        }),
    }
}

fn read_wasm(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_json(what: &str, text: &str) -> anyhow::Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{what} is not valid JSON: {text}"))
}

fn inspect_command(wasm_file: &Path, json: bool) -> anyhow::Result<()> {
    let wasm = read_wasm(wasm_file)?;
    let manifest = ContractManifest::parse(&wasm)?;
    let abi = manifest.detect_abi();
    let problems = abi.map(|abi| manifest.problems(abi)).unwrap_or_default();

    if json {
        let output = json!({
            "manifest": manifest,
            "abi": abi,
            "problems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Contract: {}", wasm_file.display());
    println!("  size:      {} bytes", manifest.size);
    println!("  code hash: {}", manifest.code_hash);
    match abi {
        Some(abi) => println!("  abi:       {abi}"),
        None => println!("  abi:       unknown (no instantiate/execute or init/handle exports)"),
    }

    println!();
    println!("Imports:");
    for import in &manifest.imports {
        println!("  {}::{}", import.module, import.name);
    }

    println!();
    println!("Exports:");
    for export in &manifest.exports {
        match export.arity {
            Some(arity) => println!(
                "  {} ({} -> {})",
                export.name, arity.params, arity.results
            ),
            None => println!("  {} ({:?})", export.name, export.kind),
        }
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for problem in &problems {
            println!("  {problem}");
        }
    }
    Ok(())
}

struct RunArgs {
    wasm_file: PathBuf,
    config: Option<PathBuf>,
    abi: Option<AbiAdapter>,
    sender: String,
    label: String,
    init: String,
    execute: Vec<String>,
    query: Vec<String>,
}

fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let wasm = read_wasm(&args.wasm_file)?;

    let mut config = match &args.config {
        Some(path) => MocknetConfig::from_json_file(path)?,
        None => MocknetConfig::default(),
    };
    if let Some(abi) = args
        .abi
        .or_else(|| ContractManifest::parse(&wasm).ok()?.detect_abi())
    {
        config = config.with_abi(abi);
    }

    let init = parse_json("--init", &args.init)?;
    let mocknet = Mocknet::new(config)?;
    let code = mocknet.upload(wasm);
    let contract = mocknet.instantiate(
        code.code_id,
        InstantiateOptions::new(&args.label, &args.sender).with_init_msg(init),
    )?;

    let mut executions = Vec::new();
    for msg in &args.execute {
        let msg = parse_json("--execute", msg)?;
        let response = mocknet.execute(&contract.address, &msg, &args.sender)?;
        executions.push(json!({ "msg": msg, "response": response }));
    }

    let mut queries = Vec::new();
    for msg in &args.query {
        let msg = parse_json("--query", msg)?;
        let answer = mocknet.query(&contract.address, &msg)?;
        queries.push(json!({ "msg": msg, "answer": answer }));
    }

    let output = json!({
        "code_id": code.code_id,
        "code_hash": code.code_hash,
        "abi": mocknet.config().abi,
        "address": contract.address,
        "instantiate": contract.response,
        "executions": executions,
        "queries": queries,
        "block": {
            "height": mocknet.block().height,
            "time": mocknet.block().time,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
