//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resolve and download thesis documents listed in a registry export.
///
/// Each input line is a registry URL ending in `=<item id>`. Items already recorded in
/// the cache are skipped, so an interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "thesis-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/thesis-downloader/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process an input list of registry URLs
    Run(RunArgs),

    /// Inspect or edit the dedup cache
    Cache(CacheArgs),
}

/// Options of `run`. Unset values fall back to the config file, then built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Newline-delimited file of registry URLs
    pub input: PathBuf,

    /// Directory documents are written to (created if missing)
    pub output_dir: Option<PathBuf>,

    /// Cache database (default: OUTPUT_DIR/.thesis-downloader/cache.db)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Items processed at once (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Attempts per network operation, including the first (1-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Fixed delay between attempts in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Upper bound of the random jitter added to each delay, in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_jitter_ms: Option<u64>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(long, value_name = "S", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Outbound proxy URL for every request
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Wait after page load before reading rendered HTML, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Maximum concurrent headless browser sessions (1-16)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=16))]
    pub render_sessions: Option<u32>,

    /// Accept invalid TLS certificates (many repositories run expired ones)
    #[arg(long)]
    pub insecure: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Cache database to operate on
    #[arg(long, value_name = "PATH")]
    pub cache: PathBuf,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Print every record, oldest first
    List,
    /// Delete the record for one item so the next run retries it
    Forget {
        /// Registry item id
        id: String,
    },
    /// Delete every record
    Clear,
    /// Print the number of records
    Count,
}
