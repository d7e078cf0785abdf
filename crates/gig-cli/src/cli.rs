//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// gigmarket - escrow job marketplace tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "gigmarket")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Market config file (JSON). Defaults apply when omitted.
    #[arg(short, long, env = "GIGMARKET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable lines.
    #[default]
    Text,
    /// JSON for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a JSON action script against an in-memory marketplace and print
    /// every emitted event as a JSON line.
    Replay {
        /// Path to the script.
        script: PathBuf,

        /// Stop at the first rejected action.
        #[arg(long)]
        strict: bool,
    },

    /// Show how a price splits into freelancer payout and platform fee.
    Fee {
        /// Price in base units.
        price: u64,
    },

    /// Validate a config file and print the effective settings.
    Config {
        /// Path to the config file.
        path: PathBuf,
    },
}
