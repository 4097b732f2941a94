//! CLI parse: clap types for docweave. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// docweave CLI - structured long-form document generation
#[derive(Parser)]
#[command(name = "docweave")]
#[command(about = "Plan, draft and assemble long-form documents with language models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config discovery)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Request options shared by `generate` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Free-text instruction describing the document
    #[arg(long, short = 'i')]
    pub instruction: String,

    /// TOML outline file: optional `title` plus `[[section]]` tables with `level` and `title`
    #[arg(long)]
    pub outline_file: Option<PathBuf>,

    /// Keep level-2 outline entries as subsections
    #[arg(long)]
    pub expand_outline: bool,

    /// Document-wide minimum length in characters
    #[arg(long)]
    pub min_total_chars: Option<usize>,

    /// Document-wide maximum length in characters
    #[arg(long)]
    pub max_total_chars: Option<usize>,

    /// Skip model-backed planning and fill sections without model calls
    #[arg(long)]
    pub fast: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a document and stream progress
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        /// Fail instead of filling sections whose drafts all failed
        #[arg(long)]
        strict: bool,

        /// Draft one section at a time
        #[arg(long)]
        serial: bool,

        /// Print every event as one JSON line
        #[arg(long)]
        json: bool,
    },
    /// Resolve and print the document plan without drafting
    Plan {
        #[command(flatten)]
        request: RequestArgs,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List models available from the configured provider
    Models,
    /// Section cache commands
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache location and size
    Stats,
    /// Remove every cached section
    Clear,
}
