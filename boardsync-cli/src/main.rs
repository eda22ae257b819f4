//! boardsync: keep a record store and a work-management board in step.
//!
//! # Usage
//!
//! ```text
//! boardsync serve [--config <path>] [--log-json]
//! boardsync sync <area> [--dry-run] [--json]
//! boardsync sync --all [--dry-run] [--json]
//! boardsync plan <area> [--json]
//! boardsync config init|show
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, plan::PlanArgs, serve::ServeArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "boardsync",
    version,
    about = "Synchronize store records with a work-management board",
    long_about = None,
)]
struct Cli {
    /// Config file to use instead of ~/.boardsync/config.yaml.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook and sync HTTP server.
    Serve(ServeArgs),

    /// Reconcile one area (or all of them) against its board.
    Sync(SyncArgs),

    /// Show the changes a sync would make for an area.
    Plan(PlanArgs),

    /// Create or print the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Plan(args) => args.run(config),
        Commands::Config { command } => commands::config::run(command, config),
    }
}
