//! Vaultkeep CLI - consistent backups and restores of containerized application data
//!
//! This is the main entry point for the vaultkeep command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use camino::Utf8Path;
use clap::Parser;
use std::fs::{self, File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet, cli.log_file.as_deref());

    match cli.command {
        Commands::Backup(args) => commands::backup::run(args, &cli.config).await,
        Commands::Restore(args) => commands::restore::run(args, &cli.config).await,
        Commands::RunScheduler(args) => commands::schedule::run(args, &cli.config).await,
        Commands::List(args) => commands::list::run(args, &cli.config),
        Commands::Prune(args) => commands::prune::run(args, &cli.config),
    }
}

/// Initialize tracing with appropriate verbosity, optionally mirrored to a file
fn init_tracing(verbose: u8, quiet: bool, log_file: Option<&Utf8Path>) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            open_error = Some(format!("Cannot write log file {}: {}", path, e));
            None
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(filter)
        .init();

    if let Some(message) = open_error {
        tracing::warn!("{}; continuing with console logging only", message);
    }
}

fn open_log_file(path: &Utf8Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
