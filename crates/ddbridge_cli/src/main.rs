//! ddbridge CLI
//!
//! Command-line tools for files written by a running bridge.
//!
//! # Commands
//!
//! - `dump-recording` - List the entries of a command recording
//! - `dump-snapshot` - List the relations stored in an input snapshot file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ddbridge inspection tools.
#[derive(Parser)]
#[command(name = "ddbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the entries of a command recording
    DumpRecording {
        /// Recording file
        file: PathBuf,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump the relations stored in a snapshot file
    DumpSnapshot {
        /// Snapshot file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::DumpRecording {
            file,
            limit,
            format,
        } => {
            commands::dump_recording::run(&file, limit, &format)?;
        }
        Commands::DumpSnapshot { file, format } => {
            commands::dump_snapshot::run(&file, &format)?;
        }
        Commands::Version => {
            println!("ddbridge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ddbridge Core v{}", ddbridge_core::VERSION);
        }
    }

    Ok(())
}
