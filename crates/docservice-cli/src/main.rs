//! DocService - multi-handler assistant CLI
//!
//! The `docservice` command routes questions to a computational, knowledge,
//! or general handler.
//!
//! ## Commands
//!
//! - `chat`: Interactive question loop
//! - `ask`: Answer one question
//! - `classify`: Show the routing decision for a question
//! - `exec`: Run a script file through the sandbox
//! - `config`: Print the effective configuration

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};

use docservice_core::{
    Decision, ExecutionOutcome, Orchestrator, PythonSandbox, ScriptExecutor, ServiceConfig,
    METRICS,
};

#[derive(Parser)]
#[command(name = "docservice")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Route questions to a code, knowledge, or general handler", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "DOCSERVICE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory scripts run in and documents are indexed from
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions interactively until `exit`, `quit`, `çıkış`, or end of input
    Chat,

    /// Answer a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Also print the routing decision
        #[arg(long)]
        show_decision: bool,
    },

    /// Print the routing decision for a question as JSON
    Classify {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Run a script (or a model reply containing one) through the sandbox
    Exec {
        /// File holding the script
        file: PathBuf,

        /// Deadline in seconds (default: sandbox.deadline_secs)
        #[arg(long)]
        deadline: Option<u64>,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    docservice_core::init_tracing(cli.json, level);

    let config = build_config(cli.config.as_deref(), cli.data_root)?;

    let result = match cli.command {
        Commands::Chat => cmd_chat(&config).await,
        Commands::Ask {
            query,
            show_decision,
        } => cmd_ask(&config, &query.join(" "), show_decision).await,
        Commands::Classify { query } => cmd_classify(&config, &query.join(" ")).await,
        Commands::Exec { file, deadline } => cmd_exec(&config, &file, deadline).await,
        Commands::Config => print_json(&config),
    };

    METRICS.flush();
    result
}

/// Layer CLI flags over file and environment configuration.
fn build_config(path: Option<&Path>, data_root: Option<PathBuf>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load(path).context("Failed to load configuration")?;
    if let Some(root) = data_root {
        config.sandbox.data_root = root;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn orchestrator(config: &ServiceConfig) -> Result<Orchestrator> {
    Orchestrator::from_config(config).context("Failed to start DocService")
}

/// Interactive loop. One line is one question.
async fn cmd_chat(config: &ServiceConfig) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    println!("DocService {} (type 'exit' to quit)", docservice_core::VERSION);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit_command(query) {
            break;
        }

        let state = orchestrator.handle(query).await;
        if let Some(decision) = state.decision() {
            info!(task_type = %decision.task_type, "answered");
        }
        println!("{}", state.response().unwrap_or_default());
    }
    Ok(())
}

async fn cmd_ask(config: &ServiceConfig, query: &str, show_decision: bool) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let state = orchestrator.handle(query).await;
    if show_decision {
        if let Some(decision) = state.decision() {
            println!("{}", describe_decision(decision));
        }
    }
    println!("{}", state.response().unwrap_or_default());
    Ok(())
}

async fn cmd_classify(config: &ServiceConfig, query: &str) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let decision = orchestrator.classifier().classify(query).await;
    print_json(&decision)
}

async fn cmd_exec(config: &ServiceConfig, file: &Path, deadline: Option<u64>) -> Result<()> {
    let outcome = exec_file(config, file, deadline).await?;
    print_json(&outcome)
}

async fn exec_file(
    config: &ServiceConfig,
    file: &Path,
    deadline: Option<u64>,
) -> Result<ExecutionOutcome> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script: {}", file.display()))?;
    let sandbox = PythonSandbox::new(config.sandbox.clone()).context("Invalid sandbox settings")?;
    let deadline = deadline
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.sandbox.deadline());
    Ok(sandbox.execute(&raw, deadline).await)
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | "çıkış")
}

fn describe_decision(decision: &Decision) -> String {
    let mut text = format!("[{}] {}", decision.task_type, decision.reason);
    for (i, step) in decision.plan.iter().enumerate() {
        text.push_str(&format!("\n  {}. {}", i + 1, step));
    }
    text
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
