//! AceFlow MCP Server
//!
//! Serves the AceFlow workflow tools over MCP stdio and offers a few
//! maintenance commands for configuration files.

use aceflow_config::{ConfigDetector, ConfigMigrator, MigrationStrategy, ServerMode};
use aceflow_server::{tool_definition, McpServer, ServerOptions, UnifiedServer, MCP_VERSION};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aceflow-server")]
#[command(about = "AceFlow MCP Server - staged workflow guidance for AI assistants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project working directory
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Unified or legacy config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server mode preset
    #[arg(long, global = true, value_parser = ["basic", "standard", "enhanced"])]
    mode: Option<String>,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP Server in stdio mode
    Stdio,

    /// List available tools
    ListTools,

    /// Print server info
    Info,

    /// Migrate a legacy config file to the unified format
    Migrate {
        /// Legacy config file
        file: PathBuf,

        /// How to write the result
        #[arg(long, value_enum, default_value_t = StrategyArg::CreateNew)]
        strategy: StrategyArg,
    },

    /// Detect the format of a config file
    Detect {
        /// Config file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Back up the source, then overwrite it
    Backup,
    /// Write `<stem>_unified.json` next to the source
    CreateNew,
}

impl From<StrategyArg> for MigrationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Backup => MigrationStrategy::BackupAndReplace,
            StrategyArg::CreateNew => MigrationStrategy::CreateNew,
        }
    }
}

fn init_logging(level: &str) {
    // stdout carries the protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_server(cli: &Cli) -> Result<UnifiedServer> {
    let mut options = ServerOptions::new(&cli.project_dir);
    if let Some(path) = &cli.config {
        options = options.config_path(path);
    }
    if let Some(mode) = &cli.mode {
        let mode = ServerMode::parse(mode).ok_or_else(|| anyhow!("Invalid mode: {}", mode))?;
        options = options.mode(mode);
    }

    let server = UnifiedServer::new(options);
    server.initialize().await?;
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        Commands::Stdio => {
            let server = build_server(&cli).await?;
            info!("Starting AceFlow MCP Server (stdio mode)");
            McpServer::new(Arc::new(server)).start().await?;
        }

        Commands::ListTools => {
            let server = build_server(&cli).await?;
            let tools = server.tools().await;
            println!("Available tools ({}):", tools.len());
            for tool in tools {
                println!("  - {}: {}", tool, tool_definition(tool).description);
            }
        }

        Commands::Info => {
            let server = build_server(&cli).await?;
            let status = server.get_server_status().await;
            println!("AceFlow MCP Server v{}", env!("CARGO_PKG_VERSION"));
            println!("Protocol: MCP {}", MCP_VERSION);
            println!("Transport: stdio");
            println!("Mode: {}", status["config"]["effective_mode"].as_str().unwrap_or("unknown"));
            println!("Config source: {}", status["config"]["source"].as_str().unwrap_or("defaults"));
            println!("Modules:");
            if let Some(modules) = status["modules"].as_object() {
                for (name, module) in modules {
                    println!("  - {} ({})", name, module["state"].as_str().unwrap_or("unknown"));
                }
            }
            println!("Tools: {}", server.tools().await.len());
            println!("Resources: {}", server.list_resources().len());
        }

        Commands::Migrate { file, strategy } => {
            let mut migrator = ConfigMigrator::new();
            let result = migrator.migrate_file(file, (*strategy).into()).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Detect { file } => {
            let detection = ConfigDetector::new().detect_file(file).await?;
            println!("{}", serde_json::to_string_pretty(&detection)?);
        }
    }

    Ok(())
}
