//! Command-line interface for Bluetooth thermal receipt printers.
//!
//! Prints kitchen order tickets and invoices from JSON files, renders
//! previews without a printer, and can keep a printer connected with
//! `posprint watch`.
//!
//! # Configuration
//!
//! Settings live in `~/.config/posprint/config.toml` (or platform
//! equivalent). The last printer connected is saved there and reconnected
//! silently on the next run.
//!
//! # Environment Variables
//!
//! - `POSPRINT_PRINTER`: Printer identifier (overridden by `--printer`)
//! - `POSPRINT_CONFIG`: Config file path (overridden by `--config`)

mod chooser;
mod cli;
mod commands;
mod config;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, DocumentKind};
use crate::config::Config;
use crate::util::{Session, build_encoder};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Preview never needs Bluetooth.
    if let Commands::Preview { file, kind, hex } = &cli.command {
        let config_path = cli.config.clone().unwrap_or_else(Config::path);
        let encoder = build_encoder(&cli, &Config::load_from(&config_path))?;
        return commands::cmd_preview(&encoder, file.as_deref(), *kind, *hex);
    }

    let mut session = Session::open(&cli).await?;
    match cli.command {
        Commands::Scan { format } => commands::cmd_scan(&session, format).await,
        Commands::Connect => commands::cmd_connect(&mut session).await,
        Commands::Status { format } => commands::cmd_status(&mut session, format).await,
        Commands::Test => commands::cmd_print_test(&mut session).await,
        Commands::Kot { file } => {
            let document = commands::load_document(&file, DocumentKind::Kot, false)?;
            commands::cmd_print(&mut session, document).await
        }
        Commands::Invoice {
            file,
            compute_totals,
        } => {
            let document = commands::load_document(&file, DocumentKind::Invoice, compute_totals)?;
            commands::cmd_print(&mut session, document).await
        }
        Commands::Watch { format } => commands::cmd_watch(&mut session, format).await,
        Commands::Preview { .. } => unreachable!("handled above"),
    }
}
