//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::export::ExportFormat;
use crate::render::Tab;

/// Token transaction analyzer with an offline-caching gateway
#[derive(Parser, Debug)]
#[command(name = "token-analyzer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TOKEN_ANALYZER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "TOKEN_ANALYZER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TOKEN_ANALYZER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the offline-caching gateway (default)
    Serve(ServeArgs),

    /// Submit a CSV for analysis and print the results
    Analyze(AnalyzeArgs),

    /// Control a running gateway's offline worker
    #[command(subcommand)]
    Worker(WorkerCommand),
}

/// Gateway overrides
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "TOKEN_ANALYZER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "TOKEN_ANALYZER_HOST")]
    pub host: Option<String>,

    /// Origin to proxy (e.g. <http://127.0.0.1:3000>)
    #[arg(long)]
    pub upstream: Option<String>,

    /// Persist cache buckets under this directory
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Proxy without the offline worker
    #[arg(long)]
    pub no_offline: bool,
}

/// Analysis form fields; omitted values fall back to the form defaults
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Transactions CSV to upload
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// SOL/USD price
    #[arg(long)]
    pub sol_price: Option<String>,

    /// Token address
    #[arg(long)]
    pub token_address: Option<String>,

    /// Token total supply
    #[arg(long)]
    pub total_supply: Option<String>,

    /// Market cap threshold in USD
    #[arg(long)]
    pub market_cap_threshold: Option<String>,

    /// Analysis endpoint (overrides client.endpoint)
    #[arg(long, env = "TOKEN_ANALYZER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Tab to print and export (transactions, whale-report)
    #[arg(long, default_value = "transactions")]
    pub tab: Tab,

    /// Export the tab as csv or json
    #[arg(long)]
    pub export: Option<ExportFormat>,

    /// Directory exports are written to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Print the results markup instead of a text table
    #[arg(long)]
    pub html: bool,
}

/// Worker control subcommands
#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Promote the waiting worker immediately
    SkipWaiting {
        /// Gateway base URL (defaults to the configured listener)
        #[arg(long)]
        url: Option<String>,
    },

    /// Show active and waiting workers, buckets and cache statistics
    Status {
        /// Gateway base URL (defaults to the configured listener)
        #[arg(long)]
        url: Option<String>,
    },
}
