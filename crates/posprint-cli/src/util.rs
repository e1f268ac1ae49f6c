//! Shared setup for commands: backend selection, config paths, document files.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use posprint_core::btle::BtleplugBackend;
use posprint_core::{
    BluetoothBackend, ChooserOutcome, DeviceCandidate, DocumentEncoder, MockBackend,
    PrinterManager, PrinterSupervisor,
};
use serde::de::DeserializeOwned;

use crate::chooser::TerminalChooser;
use crate::cli::Cli;
use crate::config::Config;

/// Identifier reported by the `--mock` printer.
pub const MOCK_PRINTER_ID: &str = "00:11:22:33:44:55";

/// Everything a command needs, built once from flags and config.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub quiet: bool,
    pub mock: bool,
    pub backend: Arc<dyn BluetoothBackend>,
    pub supervisor: PrinterSupervisor,
}

impl Session {
    pub async fn open(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(Config::path);
        let config = Config::load_from(&config_path);

        let connection = config.connection_config(cli.printer.as_deref());
        let backend: Arc<dyn BluetoothBackend> = if cli.mock {
            Arc::new(mock_backend())
        } else {
            Arc::new(BtleplugBackend::new(&connection, Arc::new(TerminalChooser)).await)
        };
        let manager = PrinterManager::new(Arc::clone(&backend), connection)
            .context("Invalid connection settings")?;

        let encoder = build_encoder(cli, &config)?;
        let supervisor =
            PrinterSupervisor::new(Arc::new(manager), encoder, config.supervisor_config())
                .context("Invalid supervisor settings")?;

        Ok(Self {
            config,
            config_path,
            quiet: cli.quiet,
            mock: cli.mock,
            backend,
            supervisor,
        })
    }

    /// Persist the connected printer as `last_printer`. Mock sessions never
    /// touch the config file.
    pub fn remember_connected(&mut self) -> Result<()> {
        if self.mock {
            return Ok(());
        }
        let Some(device) = self.supervisor.manager().device() else {
            return Ok(());
        };
        if self.config.last_printer.as_deref() == Some(device.id.as_str()) {
            return Ok(());
        }
        self.config.remember_printer(&device.id, device.name.as_deref());
        self.config.save_to(&self.config_path)
    }

    /// Print a status line unless `--quiet`.
    pub fn note(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }
}

/// Encoder from config, with `--paper` taking precedence.
pub fn build_encoder(cli: &Cli, config: &Config) -> Result<DocumentEncoder> {
    let mut layout = config.layout.clone();
    if let Some(paper) = cli.paper {
        layout.paper = paper.into();
    }
    DocumentEncoder::new(layout).context("Invalid layout settings")
}

fn mock_backend() -> MockBackend {
    let printer = DeviceCandidate::new(MOCK_PRINTER_ID, Some("Mock Printer".to_string()));
    MockBackend::new()
        .with_scannable(printer.clone())
        .with_chooser(ChooserOutcome::Pick(printer))
}

/// Read a JSON document from `path`, or stdin when `path` is `-`.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read document from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?
    };
    if content.trim().is_empty() {
        bail!("Document is empty: {}", path.display());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse document: {}", path.display()))
}

/// Space-separated hex, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
