use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::dictionary::RiskLevel;

#[derive(Parser, Debug)]
#[command(
    name = "silenceguard",
    version,
    about = "Silenceguard - streaming keyword audit for live transcripts"
)]
pub struct Cli {
    /// Directory holding settings, dictionary, history and logs
    /// (default: ~/.config/silenceguard)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// File log level; stdout verbosity follows RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit cumulative transcript updates read from stdin, one per line
    Monitor,
    /// Scan a single text against the dictionary and print any hit
    Check {
        text: String,
        /// Override the configured similarity threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Manage the keyword dictionary
    Dict {
        #[command(subcommand)]
        command: DictCommands,
    },
    /// Show recent interception events, newest first
    History {
        /// Maximum number of events to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum DictCommands {
    /// List all entries, newest first
    List,
    /// Add a keyword, newest entries match first on ties
    Add {
        keyword: String,
        /// Variant spellings, separated by commas, semicolons or spaces
        #[arg(long)]
        variants: Option<String>,
        /// Risk classification reported with hits
        #[arg(long, value_enum, default_value_t = RiskLevel::High)]
        risk: RiskLevel,
    },
    /// Remove the entry for a keyword
    Remove { keyword: String },
}
