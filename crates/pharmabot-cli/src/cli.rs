//! CLI argument definitions for Pharmabot.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ask` | Answer one question from the catalog |
//! | `chat` | Answer questions read line by line from stdin |
//! | `status` | Show configured credentials and their health |
//! | `probe` | Send a tiny prompt through failover and report pool health |
//! | `catalog import` | Load medicines from a JSON file |
//! | `catalog search` | Run retrieval only, without generation |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `table` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--config` | none | TOML configuration file |
//! | `--catalog` | config | DuckDB catalog file |
//! | `--log-level` | `info` | Log level for pharmabot crates |
//!
//! # Examples
//!
//! ```bash
//! PHARMABOT_API_KEY_1=... pharmabot ask "What is paracetamol used for?"
//! pharmabot catalog import medicines.json
//! pharmabot --format json --pretty status
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Pharmacy assistant grounded in a local medicine catalog.
///
/// Questions are answered from catalog records only. Generation calls rotate
/// across every configured (API key, model) pair when quota runs out.
#[derive(Debug, Parser)]
#[command(
    name = "pharmabot",
    author,
    version,
    about = "Pharmacy assistant grounded in a local medicine catalog"
)]
pub struct Cli {
    /// Output format for results.
    ///
    /// - json: Single JSON object
    /// - table: Human-readable text (default)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// TOML configuration file. Falls back to `PHARMABOT_CONFIG`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// DuckDB catalog file, overriding the configuration.
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Log level for pharmabot crates (error, warn, info, debug, trace).
    ///
    /// `RUST_LOG` takes precedence when set. Logs go to stderr.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one question.
    Ask(AskArgs),
    /// Interactive session; `:status`, `:reset` and `:quit` are recognised.
    Chat,
    /// Show credential pool health.
    Status,
    /// Check that at least one credential can generate text.
    Probe(ProbeArgs),
    /// Manage the medicine catalog.
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question; multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
}

impl AskArgs {
    pub fn question(&self) -> String {
        self.question.join(" ")
    }
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Prompt sent to the model.
    #[arg(long, default_value = "Reply with the single word OK.")]
    pub prompt: String,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Insert or replace medicines from a JSON array file.
    Import(ImportArgs),
    /// Show the medicines a question would be grounded on.
    Search(SearchArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Path to a JSON array of medicine records.
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Maximum number of medicines to return.
    #[arg(long)]
    pub limit: Option<usize>,
}

impl SearchArgs {
    pub fn question(&self) -> String {
        self.question.join(" ")
    }
}
