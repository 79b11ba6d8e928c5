//! crxd CLI - hot-reload harness for browser extensions.
//!
//! Provides commands for:
//! - `dev`: Build, watch and push reload signals to the extension
//! - `patch`: Patch a built manifest for dev mode once
//! - `listen`: Attach a terminal listener to a running channel

mod commands;
mod error;
mod host;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{DevArgs, ListenArgs, PatchArgs};
use output::Output;

/// crxd - hot-reload development harness for browser extensions.
#[derive(Parser)]
#[command(name = "crxd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extension in dev mode with live reload.
    Dev(DevArgs),
    /// Patch the built manifest for dev mode.
    Patch(PatchArgs),
    /// Listen for update signals from a running `crxd dev`.
    Listen(ListenArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Dev(args) => args.verbose,
        Commands::Listen(args) => args.verbose,
        Commands::Patch(_) => false,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Dev(args) => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(args.execute())
        }
        Commands::Listen(args) => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(args.execute())
        }
        Commands::Patch(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
