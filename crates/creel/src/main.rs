//! Creel CLI - backups of a Supabase project
//!
//! This is the main entry point for the creel command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use commands::Globals;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let globals = Globals {
        config: cli.config.as_deref(),
        root: cli.root.as_deref(),
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Backup(args) => commands::backup::run(args, &globals).await,
        Commands::Emergency(args) => commands::emergency::run(args, &globals).await,
        Commands::Verify(args) => commands::verify::run(args, &globals),
        Commands::List(args) => commands::list::run(args, &globals),
        Commands::Restore(args) => commands::restore::run(args, &globals).await,
        Commands::Prune(args) => commands::prune::run(args, &globals),
        Commands::Schedule(args) => commands::schedule::run(args, &globals).await,
        Commands::Config(cmd) => commands::config::run(cmd, &globals),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
