//! Dirtmap CLI - runs circuits through the dirty-qubit mapper.
//!
//! Reads a circuit as a JSON array of commands, maps it, and reports the
//! forwarded stream together with the circuit width before and after.

mod circuit;
mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Dirty-qubit remapping tool.
///
/// Moves the work done on dirty qubits onto idle qubits so the circuit
/// needs fewer qubits at once.
#[derive(Parser)]
#[command(name = "dirtmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Suppress info messages and output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Output format options.
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a circuit through the mapper and show the forwarded commands
    Map {
        /// Path to the circuit (JSON array of commands)
        path: PathBuf,

        /// Cached commands per qubit before half of them are forwarded
        #[arg(long)]
        cache_limit: Option<usize>,

        /// Gate cost as GATE=COST, repeatable ("default=N" sets the fallback)
        #[arg(long = "cost", value_name = "GATE=COST")]
        costs: Vec<String>,

        /// Force the first remap onto this qubit id
        #[arg(long)]
        target: Option<u32>,
    },

    /// Report how many qubits a circuit keeps alive at once
    Width {
        /// Path to the circuit (JSON array of commands)
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else if !cli.quiet {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Commands::Map {
            path,
            cache_limit,
            costs,
            target,
        } => {
            let options = commands::map::MapOptions {
                cache_limit,
                costs,
                target,
            };
            commands::map::run(&path, &options, cli.format, cli.quiet)
        }
        Commands::Width { path } => commands::width::run(&path, cli.format, cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
