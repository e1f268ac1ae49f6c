//! Tunable configuration for the connection manager, supervisor and encoder.
//!
//! Defaults reflect what works for typical 58mm/80mm BLE receipt printers.
//! Every value is a product choice, not a correctness requirement, so all of
//! them can be overridden (tests shrink the intervals to milliseconds).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use posprint_types::GattProfile;
use posprint_types::uuid::KNOWN_PROFILES;

use crate::error::{Error, Result};

/// Smallest ATT payload every BLE link supports (23-byte MTU minus header).
pub const MIN_CHUNK_SIZE: usize = 20;

/// Largest value a single GATT write may carry.
pub const MAX_CHUNK_SIZE: usize = 512;

/// Configuration for discovery, GATT connection and writes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use posprint_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .chunk_size(180)
///     .connect_timeout(Duration::from_secs(20))
///     .remember("AA:BB:CC:DD:EE:FF");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the GATT connection.
    pub connect_timeout: Duration,
    /// Timeout for service discovery after connecting.
    pub discovery_timeout: Duration,
    /// Timeout for each chunk write.
    pub write_timeout: Duration,
    /// How long a silent scan listens for advertisements.
    pub scan_duration: Duration,
    /// Maximum bytes per characteristic write.
    pub chunk_size: usize,
    /// Service/characteristic pairs to look for, in priority order.
    pub profiles: Vec<GattProfile>,
    /// Identifiers of printers connected before; tried first, without prompting.
    pub remembered: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            scan_duration: Duration::from_secs(5),
            chunk_size: MIN_CHUNK_SIZE,
            profiles: KNOWN_PROFILES.to_vec(),
            remembered: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the per-chunk write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the silent scan duration.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the write chunk size.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Replace the GATT profiles to try.
    #[must_use]
    pub fn profiles(mut self, profiles: Vec<GattProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Add a remembered printer identifier.
    #[must_use]
    pub fn remember(mut self, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        if !self.remembered.contains(&identifier) {
            self.remembered.push(identifier);
        }
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::invalid_config(format!(
                "chunk_size must be between {} and {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if self.profiles.is_empty() {
            return Err(Error::invalid_config("at least one GATT profile is required"));
        }
        if self.connect_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(Error::invalid_config("timeouts must be > 0"));
        }
        Ok(())
    }
}

/// Scheduling policy for the connection supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between automatic connect retries while disconnected.
    pub retry_interval: Duration,
    /// How often a live connection is re-validated.
    pub poll_interval: Duration,
    /// Upper bound of random delay added to each poll.
    pub poll_jitter: Duration,
    /// Automatic retries after the startup attempt. Manual connects are unlimited.
    pub max_retries: u32,
    /// Whether printing may open the chooser when auto-connect finds nothing.
    pub prompt_on_print: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(3),
            poll_jitter: Duration::ZERO,
            max_retries: 5,
            prompt_on_print: true,
        }
    }
}

impl SupervisorConfig {
    /// Create a new supervisor config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn poll_jitter(mut self, jitter: Duration) -> Self {
        self.poll_jitter = jitter;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn prompt_on_print(mut self, prompt: bool) -> Self {
        self.prompt_on_print = prompt;
        self
    }

    /// Poll delay including a random jitter in `[0, poll_jitter]`.
    pub fn next_poll_delay(&self) -> Duration {
        if self.poll_jitter.is_zero() {
            return self.poll_interval;
        }
        let jitter_ms = rand::random_range(0..=self.poll_jitter.as_millis() as u64);
        self.poll_interval + Duration::from_millis(jitter_ms)
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.retry_interval.is_zero() {
            return Err(Error::invalid_config("retry_interval must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        Ok(())
    }
}

/// Paper roll width, which fixes the character grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperWidth {
    /// 58mm roll, 32 columns in Font A.
    #[default]
    Mm58,
    /// 80mm roll, 48 columns in Font A.
    Mm80,
    /// Explicit column count.
    Columns(u16),
}

impl PaperWidth {
    /// Characters per line.
    pub fn columns(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
            PaperWidth::Columns(n) => n as usize,
        }
    }
}

/// How document text is turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// 7-bit ASCII; anything else becomes `?`. Safe on every printer.
    #[default]
    Ascii,
    /// Raw UTF-8 for printers with a UTF-8 code page.
    Utf8,
}

/// Narrowest grid the invoice layout supports.
pub const MIN_COLUMNS: usize = 24;

/// Layout options for the document encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub paper: PaperWidth,
    /// Printed before every amount, e.g. `"Rs."`. Empty by default.
    pub currency_prefix: String,
    pub text_encoding: TextEncoding,
    /// Blank lines fed before the cut so the last line clears the blade.
    pub feed_lines: u8,
    /// Closing line on invoices.
    pub footer: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            paper: PaperWidth::default(),
            currency_prefix: String::new(),
            text_encoding: TextEncoding::default(),
            feed_lines: 3,
            footer: Some("Thank you! Visit again.".to_string()),
        }
    }
}

impl EncoderConfig {
    /// Create a config for the given paper.
    pub fn for_paper(paper: PaperWidth) -> Self {
        Self {
            paper,
            ..Default::default()
        }
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let columns = self.paper.columns();
        if columns < MIN_COLUMNS {
            return Err(Error::invalid_config(format!(
                "paper must have at least {} columns, got {}",
                MIN_COLUMNS, columns
            )));
        }
        if self.currency_prefix.chars().count() > 4 {
            return Err(Error::invalid_config("currency_prefix is limited to 4 characters"));
        }
        Ok(())
    }
}
