//! AI Pilot CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config and create the sandbox root
//! - `status`  — Show config, memory and audit status
//! - `fact`, `task`, `doc`, `recall` — Work with the memory store
//! - `tool`    — List or run sandboxed tools
//! - `logs`    — Tail the audit trail

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "pilot",
    about = "AI Pilot — local assistant with sandboxed tools, memory and planning",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "PILOT_CONFIG", default_value = "pilot.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the sandbox root
    Onboard {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration, memory and audit status
    Status,

    /// Manage stored facts
    Fact {
        #[command(subcommand)]
        action: commands::memory::FactAction,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: commands::memory::TaskAction,
    },

    /// Index and search documents
    Doc {
        #[command(subcommand)]
        action: commands::memory::DocAction,
    },

    /// Print the memory context a turn would receive for a query
    Recall { query: String },

    /// List or run sandboxed tools
    Tool {
        #[command(subcommand)]
        action: commands::tool::ToolAction,
    },

    /// Show recent audit records
    Logs {
        /// Show conversation turns instead of events
        #[arg(long)]
        conversations: bool,

        /// Number of records to show
        #[arg(short = 'n', long = "lines", default_value_t = 20)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard { force } => commands::onboard::run(&cli.config, force)?,
        Commands::Status => commands::status::run(&cli.config).await?,
        Commands::Fact { action } => commands::memory::fact(&cli.config, action).await?,
        Commands::Task { action } => commands::memory::task(&cli.config, action).await?,
        Commands::Doc { action } => commands::memory::doc(&cli.config, action).await?,
        Commands::Recall { query } => commands::memory::recall(&cli.config, &query).await?,
        Commands::Tool { action } => commands::tool::run(&cli.config, action).await?,
        Commands::Logs {
            conversations,
            lines,
        } => commands::logs::run(&cli.config, conversations, lines)?,
    }

    Ok(())
}
