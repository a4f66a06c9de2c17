//! Kiln CLI - static site sync engine.
//!
//! Provides commands for:
//! - `sync`: Regenerate and publish every artifact of a bucket or directory
//! - `credentials add|list|remove`: Manage stored bucket credentials

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CredentialsCommand, SyncArgs};
use error::CliError;
use output::Output;

/// Kiln - static site sync engine.
#[derive(Parser)]
#[command(name = "kiln", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the site of a bucket or local directory.
    Sync(SyncArgs),
    /// Bucket credential commands.
    #[command(subcommand)]
    Credentials(CredentialsCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Sync(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(&format!("Error: {err}"));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sync(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(args.execute())
        }
        Commands::Credentials(cmd) => cmd.execute(),
    }
}
