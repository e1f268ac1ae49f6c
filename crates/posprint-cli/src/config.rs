//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use posprint_core::{ConnectionConfig, EncoderConfig, SupervisorConfig};
use serde::{Deserialize, Serialize};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default printer identifier
    #[serde(default)]
    pub printer: Option<String>,

    /// Last successfully connected printer (auto-updated)
    #[serde(default)]
    pub last_printer: Option<String>,

    /// Name of the last connected printer (for display)
    #[serde(default)]
    pub last_printer_name: Option<String>,

    /// Receipt layout
    #[serde(default)]
    pub layout: EncoderConfig,

    /// Bluetooth connection tuning
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Reconnect policy
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

/// Connection overrides. Unset fields keep the library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub scan_secs: Option<u64>,
    /// Bytes per BLE write; raise only for printers known to accept more.
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

/// Supervisor overrides. Unset fields keep the library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default)]
    pub retry_interval_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Open the printer picker when printing finds no printer
    #[serde(default)]
    pub prompt_on_print: Option<bool>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posprint")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Record a successful connection.
    pub fn remember_printer(&mut self, identifier: &str, name: Option<&str>) {
        self.last_printer = Some(identifier.to_string());
        self.last_printer_name = name.map(|n| n.to_string());
    }

    /// Printers to reconnect to without prompting, most specific first.
    pub fn known_printers(&self, explicit: Option<&str>) -> Vec<String> {
        let mut printers: Vec<String> = Vec::new();
        for id in [explicit, self.printer.as_deref(), self.last_printer.as_deref()]
            .into_iter()
            .flatten()
        {
            if !printers.iter().any(|p| p == id) {
                printers.push(id.to_string());
            }
        }
        printers
    }

    pub fn connection_config(&self, explicit: Option<&str>) -> ConnectionConfig {
        let settings = &self.connection;
        let mut config = ConnectionConfig::default();
        if let Some(secs) = settings.connect_timeout_secs {
            config = config.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.scan_secs {
            config = config.scan_duration(Duration::from_secs(secs));
        }
        if let Some(size) = settings.chunk_size {
            config = config.chunk_size(size);
        }
        self.known_printers(explicit)
            .into_iter()
            .fold(config, |config, id| config.remember(id))
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let settings = &self.supervisor;
        let mut config = SupervisorConfig::default();
        if let Some(secs) = settings.retry_interval_secs {
            config = config.retry_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.poll_interval_secs {
            config = config.poll_interval(Duration::from_secs(secs));
        }
        if let Some(retries) = settings.max_retries {
            config = config.max_retries(retries);
        }
        if let Some(prompt) = settings.prompt_on_print {
            config = config.prompt_on_print(prompt);
        }
        config
    }
}
