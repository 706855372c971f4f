// ============================================================================
// task-ledger: CLI for the on-chain task result ledger
// ============================================================================
// Usage:
//   task-ledger submit 7 --text "..."        Write a task result (or --file / stdin)
//   task-ledger get-task 7                   Show a task's on-chain record
//   task-ledger task-result 7                Show only a task's stored result
//   task-ledger recent --count 10            Recent tasks rebuilt from events
//   task-ledger limits                       Storage limits and cost notes
//   task-ledger prepare --file out.md        Preview stored content (offline)
// ============================================================================

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use ledger_core::service::storage_limits_info;
use ledger_core::{LedgerConfig, LedgerService, StorageLimits, TaskStatus, TaskSummary};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// Task result ledger client
#[derive(Parser)]
#[command(name = "task-ledger", version, about = "Write and inspect task results on the ledger contract")]
struct Cli {
    /// Contract ABI file (overrides ABI_PATH)
    #[arg(long, global = true, env = "ABI_PATH")]
    abi_path: Option<PathBuf>,

    /// Chain node URL (overrides RPC_ENDPOINT)
    #[arg(long, global = true, env = "RPC_ENDPOINT")]
    rpc_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a result and write it to the ledger, waiting for confirmation
    Submit {
        task_id: u64,

        #[command(flatten)]
        input: ContentInput,
    },

    /// Read a task's full on-chain record
    GetTask { task_id: u64 },

    /// Read only the stored result of a task
    TaskResult { task_id: u64 },

    /// List recent tasks reconstructed from ledger events
    Recent {
        #[arg(long, default_value = "10")]
        count: usize,

        /// Print a table instead of JSON
        #[arg(long)]
        table: bool,
    },

    /// Show storage limits and cost guidance
    Limits,

    /// Show what would be stored for some content, without touching the chain
    Prepare {
        #[command(flatten)]
        input: ContentInput,
    },
}

#[derive(clap::Args)]
struct ContentInput {
    /// Result text
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// Read result text from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ContentInput {
    /// --text, then --file, then stdin
    async fn read(self) -> Result<String> {
        if let Some(text) = self.text {
            return Ok(text);
        }
        if let Some(path) = self.file {
            return tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()));
        }
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read result text from stdin")?;
        Ok(buf)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ledger_core=info".parse()?)
                .add_directive("task_ledger=info".parse()?),
        )
        .init();
    Ok(())
}

/// Build the ledger config with CLI flags taking precedence over `env`
fn load_config<F>(abi_path: Option<PathBuf>, rpc_endpoint: Option<String>, env: F) -> Result<LedgerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = LedgerConfig::from_lookup(|key| match key {
        "RPC_ENDPOINT" => rpc_endpoint.clone().or_else(|| env(key)),
        _ => env(key),
    })
    .context("Invalid ledger configuration")?;

    if let Some(path) = abi_path {
        config.abi_path = path;
    }
    Ok(config)
}

fn connect(abi_path: Option<PathBuf>, rpc_endpoint: Option<String>) -> Result<LedgerService> {
    let config = load_config(abi_path, rpc_endpoint, |key| std::env::var(key).ok())?;
    let service = LedgerService::connect(&config).context("Failed to connect to ledger")?;
    info!("Using signer {}", service.signer_address());
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    init_logging()?;
    let Cli {
        abi_path,
        rpc_endpoint,
        command,
    } = Cli::parse();

    match command {
        // Offline commands need no chain connection
        Commands::Limits => {
            print_json(&storage_limits_info(&StorageLimits::default()))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Prepare { input } => {
            let content = input.read().await?;
            print_json(&StorageLimits::default().prepare(&content))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Submit { task_id, input } => {
            let service = connect(abi_path, rpc_endpoint)?;
            cmd_submit(&service, task_id, input).await
        }
        Commands::GetTask { task_id } => {
            let service = connect(abi_path, rpc_endpoint)?;
            print_json(&service.read_task(task_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::TaskResult { task_id } => {
            let service = connect(abi_path, rpc_endpoint)?;
            print_json(&service.task_result(task_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Recent { count, table } => {
            let service = connect(abi_path, rpc_endpoint)?;
            let tasks = service.recent_tasks(count).await?;
            if table {
                print_table(&tasks);
            } else {
                print_json(&tasks)?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_submit(service: &LedgerService, task_id: u64, input: ContentInput) -> Result<ExitCode> {
    let content = input.read().await?;
    if content.trim().is_empty() {
        warn!("Submitting an empty result for task {}", task_id);
    }

    let outcome = service.prepare_and_submit(task_id, &content).await;
    print_json(&outcome)?;

    if outcome.success {
        info!(
            "Task {} written at {}",
            task_id,
            format_timestamp(outcome.submitted_at)
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "Submission failed{}: {}",
            if outcome.retryable { " (retryable)" } else { "" },
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        Ok(ExitCode::FAILURE)
    }
}

fn print_table(tasks: &[TaskSummary]) {
    if tasks.is_empty() {
        println!("No tasks found in the scanned block range.");
        return;
    }

    println!("{:<8}  {:<10}  {:<10}  {:<24}  {}", "TASK ID", "STATUS", "BLOCK", "TOPIC", "RESULT");
    println!("{}", "-".repeat(90));

    for task in tasks {
        let status = match task.status {
            TaskStatus::Created => "created",
            TaskStatus::Completed => "completed",
        };
        let topic: String = task.topic.as_deref().unwrap_or("-").chars().take(24).collect();
        let result: String = task
            .result
            .as_deref()
            .unwrap_or("-")
            .chars()
            .take(30)
            .collect::<String>()
            .replace('\n', " ");
        println!(
            "{:<8}  {:<10}  {:<10}  {:<24}  {}",
            task.id,
            status,
            task.relevant_block(),
            topic,
            result
        );
    }

    println!("\nTotal: {} tasks", tasks.len());
}
