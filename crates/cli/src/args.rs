//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// news-digest: Telegram bot that polls channels, normalizes posts and delivers them for review
#[derive(Parser, Debug)]
#[command(name = "news-digest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll subscribed channels and handle user commands
    Run(RunArgs),

    /// Normalize a piece of text the way posts are normalized before delivery
    Normalize(NormalizeArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single poll cycle and exit (no command handling)
    #[arg(long)]
    pub once: bool,

    /// Write deliveries to this JSONL file instead of sending them
    #[arg(long)]
    pub outbox: Option<PathBuf>,

    /// Keep subscriptions in memory only; nothing is written to the state database
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Text to normalize
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File containing text to normalize (use - for stdin)
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (file plus environment overrides)
    Show,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
