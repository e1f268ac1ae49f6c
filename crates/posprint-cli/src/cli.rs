//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use posprint_core::PaperWidth;

/// Output format for commands that report data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Paper roll width
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Paper {
    /// 58mm roll, 32 columns
    #[value(name = "58")]
    Mm58,
    /// 80mm roll, 48 columns
    #[value(name = "80")]
    Mm80,
}

impl From<Paper> for PaperWidth {
    fn from(paper: Paper) -> Self {
        match paper {
            Paper::Mm58 => PaperWidth::Mm58,
            Paper::Mm80 => PaperWidth::Mm80,
        }
    }
}

/// Which document a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentKind {
    Kot,
    Invoice,
    Test,
}

#[derive(Debug, Parser)]
#[command(name = "posprint")]
#[command(author, version, about = "Print KOTs and invoices on Bluetooth thermal printers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "POSPRINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Printer to reconnect to silently (MAC address or UUID)
    #[arg(short, long, global = true, env = "POSPRINT_PRINTER")]
    pub printer: Option<String>,

    /// Paper width in millimetres (overrides config)
    #[arg(long, global = true, value_enum)]
    pub paper: Option<Paper>,

    /// Use an in-memory printer instead of Bluetooth
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby printers
    Scan {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Pick a printer interactively and remember it
    Connect,

    /// Show connection state after one automatic connect attempt
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the diagnostic test page
    Test,

    /// Print a kitchen order ticket from a JSON file ("-" for stdin)
    Kot { file: PathBuf },

    /// Print an invoice from a JSON file ("-" for stdin)
    Invoice {
        file: PathBuf,

        /// Recompute subtotal and total from the lines
        #[arg(long)]
        compute_totals: bool,
    },

    /// Render a document without printing it
    Preview {
        file: Option<PathBuf>,

        /// Document kind held by FILE
        #[arg(short, long, value_enum, default_value = "kot")]
        kind: DocumentKind,

        /// Dump the raw ESC/POS bytes as hex
        #[arg(long)]
        hex: bool,
    },

    /// Keep a printer connected and log connection events until Ctrl-C
    Watch {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
