//! CLI entry point for the thesis downloader.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

mod app;
mod cli;
mod config;

use cli::{Cli, Command};

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Stopped by Ctrl-C; the summary was still printed.
    Interrupted,
}

impl ProcessExit {
    fn code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    app::terminal::init_tracing(app::terminal::default_log_level(cli.verbose, cli.quiet));
    debug!(?cli, "CLI arguments parsed");

    match dispatch(&cli).await {
        Ok(exit) => exit.code(),
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ProcessExit> {
    match &cli.command {
        Command::Run(args) => {
            let file = config::load(cli.config.as_deref())?;
            app::runtime::run_batch(args, &file, cli.quiet).await
        }
        Command::Cache(args) => app::cache_commands::run_cache_command(args).await,
    }
}
