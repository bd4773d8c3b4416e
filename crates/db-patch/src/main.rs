//! db-patch - run sequential .sql files as transactions
//!
//! Tracks the last applied revision in a marker table so every patch file
//! runs exactly once.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod prompt;

use cli::{Cli, Commands, LogFormat};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.command == Some(Commands::Version) {
        println!("db-patch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing(cli.global.verbose, cli.global.log_format)?;

    // Load configuration
    let config = config::Config::load(&cli.global)?;

    // Execute command
    match cli.command.unwrap_or(Commands::Apply) {
        Commands::Apply => commands::apply::execute(&config, cli.global.yes),
        Commands::Status { json } => commands::status::execute(json, &config),
        Commands::Version => Ok(()),
    }
}

/// Logs go to stderr so `status --json` output stays clean
fn init_tracing(verbose: u8, format: LogFormat) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("db_patch={}", level).parse()?)
        .add_directive(format!("dbpatch_core={}", level).parse()?);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
