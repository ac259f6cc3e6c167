//! Amalgam CLI - pack a PHP application from the command line.
//!
//! Reads an `amalgam.json` configuration, runs the analysis-and-merge
//! pipeline, and writes a single self-contained output file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// Amalgam: pack a multi-file PHP application into a single file.
#[derive(Parser)]
#[command(name = "amalgam")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file, relative to the project root
    #[arg(short, long, global = true, default_value = "amalgam.json")]
    config: PathBuf,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the packed output file
    Pack,

    /// Print the computed load order without writing output
    Order,

    /// List the symbols stored by the last analysis
    Symbols {
        /// Only show symbols whose name contains this substring
        query: Option<String>,
    },

    /// Show store statistics
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let root = match cli.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let result = match cli.command {
        Commands::Pack => cli::pack::run(&root, &cli.config),
        Commands::Order => cli::order::run(&root, &cli.config),
        Commands::Symbols { query } => cli::symbols::run(&root, &cli.config, query.as_deref()),
        Commands::Stats => cli::stats::run(&root, &cli.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  {}: {cause}", "caused by".dimmed());
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}
