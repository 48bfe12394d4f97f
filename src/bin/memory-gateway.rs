//! CLI entry point: `serve` runs the engine until signalled, `stats` and
//! `memory` are one-shot diagnostic/operational commands (SPEC_FULL §A).

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hybrid_memory_gateway::config::Config;
use hybrid_memory_gateway::engine::Engine;
use hybrid_memory_gateway::tools::{self, Tool};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memory-gateway", about = "Hybrid two-tier memory cache and retrieval gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until SIGINT/Ctrl-C.
    Serve,
    /// Print cache_stats and sync_status once, then exit.
    Stats,
    /// One-shot memory operations against a freshly bootstrapped engine.
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Add a memory (`add_memory`).
    Add {
        content: String,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, default_value = "low")]
        priority: String,
        #[arg(long)]
        sync: bool,
    },
    /// Search memories (`search_memory`).
    Search {
        query: String,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// List memories (`get_all_memories`).
    Get {
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Delete a memory (`delete_memory`).
    Delete { memory_id: String },
    /// Find duplicate groups (`deduplicate_memories`).
    Dedupe {
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memory_gateway=info,hybrid_memory_gateway=info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::from(1);
        }
    };

    let engine = match Engine::bootstrap(config).await {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "engine bootstrap failed");
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Commands::Serve => run_serve(engine).await,
        Commands::Stats => run_stats(engine).await,
        Commands::Memory { command } => run_memory(engine, command).await,
    }
}

async fn run_serve(engine: Engine) -> ExitCode {
    tracing::info!(mode = engine.degradation.current_mode().as_str(), "serving");
    tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
            engine.shutdown().await;
            ExitCode::from(130)
        }
    }
}

async fn run_stats(engine: Engine) -> ExitCode {
    let stats = match tools::CacheStatsTool.execute(serde_json::json!({}), &engine).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(error = %err, code = err.code(), "cache_stats failed");
            return ExitCode::from(1);
        }
    };
    let status = match tools::SyncStatusTool.execute(serde_json::json!({}), &engine).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(error = %err, code = err.code(), "sync_status failed");
            return ExitCode::from(1);
        }
    };
    println!(
        "{}",
        serde_json::json!({ "cache": stats.result, "sync": status.result })
    );
    ExitCode::from(0)
}

async fn run_memory(engine: Engine, command: MemoryCommand) -> ExitCode {
    let (tool, params): (&dyn Tool, serde_json::Value) = match &command {
        MemoryCommand::Add { content, user_id, priority, sync } => (
            &tools::AddMemoryTool,
            serde_json::json!({
                "content": content,
                "user_id": user_id,
                "priority": priority,
                "async": !sync,
            }),
        ),
        MemoryCommand::Search { query, user_id, limit } => (
            &tools::SearchMemoryTool,
            serde_json::json!({ "query": query, "user_id": user_id, "limit": limit }),
        ),
        MemoryCommand::Get { user_id, limit, offset } => (
            &tools::GetAllMemoriesTool,
            serde_json::json!({ "user_id": user_id, "limit": limit, "offset": offset }),
        ),
        MemoryCommand::Delete { memory_id } => (
            &tools::DeleteMemoryTool,
            serde_json::json!({ "memory_id": memory_id }),
        ),
        MemoryCommand::Dedupe { user_id, dry_run } => (
            &tools::DeduplicateMemoriesTool,
            serde_json::json!({ "user_id": user_id, "dry_run": dry_run }),
        ),
    };

    match tool.execute(params, &engine).await {
        Ok(output) => {
            println!("{}", output.result);
            ExitCode::from(0)
        }
        Err(err) => {
            tracing::error!(error = %err, code = err.code(), "memory command failed");
            ExitCode::from(1)
        }
    }
}
