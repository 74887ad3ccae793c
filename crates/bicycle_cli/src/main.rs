//! Bicycle CLI
//!
//! Command-line tools for Bicycle data directories.
//!
//! # Commands
//!
//! - `register` - Register a model from a JSON definition
//! - `exec` - Run one JSON request and print the JSON response
//! - `inspect` - Display models, record counts, and log size
//! - `verify` - Check every index against its records
//! - `checkpoint` - Compact the write-ahead log

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Bicycle command-line tools.
#[derive(Parser)]
#[command(name = "bicycle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a model
    Register {
        /// Model definition as JSON, or `@file` to read it from a file
        #[arg(short, long)]
        schema: String,
    },

    /// Run one request against the engine
    Exec {
        /// Request envelope as JSON, or `@file` to read it from a file
        #[arg(short, long)]
        request: String,
    },

    /// Display models, record counts, and log size
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every index against its records
    Verify,

    /// Compact the write-ahead log
    Checkpoint,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Register { schema } => {
            let path = commands::require_path(cli.path, "register")?;
            commands::register::run(&path, &schema)?;
        }
        Commands::Exec { request } => {
            let path = commands::require_path(cli.path, "exec")?;
            commands::exec::run(&path, &request)?;
        }
        Commands::Inspect { format } => {
            let path = commands::require_path(cli.path, "inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = commands::require_path(cli.path, "verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Checkpoint => {
            let path = commands::require_path(cli.path, "checkpoint")?;
            commands::checkpoint::run(&path)?;
        }
        Commands::Version => {
            println!("Bicycle CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Protocol v{}", bicycle_core::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
