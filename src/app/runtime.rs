//! The `run` command: build the pipeline from settings and drive one batch.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use thesis_downloader_core::resolver::{ChromiumRenderer, build_http_client};
use thesis_downloader_core::{
    BatchRunner, BatchSummary, DedupCache, DocumentFetcher, Normalizer, Pipeline,
    PipelineSettings, StrategySet, parse_source_list,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::progress_manager::ProgressUi;
use crate::app::terminal;
use crate::cli::RunArgs;
use crate::config::{FileConfig, RunSettings};

pub(crate) async fn run_batch(args: &RunArgs, file: &FileConfig, quiet: bool) -> Result<ProcessExit> {
    let settings = RunSettings::resolve(args, file)?;
    debug!(?settings, "run settings resolved");

    let input_text = tokio::fs::read_to_string(&settings.input)
        .await
        .with_context(|| format!("Failed to read input file '{}'", settings.input.display()))?;
    let entries = parse_source_list(&input_text);
    info!(items = entries.len(), input = %settings.input.display(), "Parsed input");

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                settings.output_dir.display()
            )
        })?;

    let normalizer = Normalizer::new(settings.normalizer_rules()?);
    let cache = DedupCache::open_with_busy_timeout(&settings.cache_path, settings.db_busy_timeout)
        .await
        .with_context(|| format!("Failed to open cache '{}'", settings.cache_path.display()))?;
    let client = build_http_client(&settings.http).context("Failed to build HTTP client")?;
    let strategies = StrategySet::new(
        client.clone(),
        Arc::new(ChromiumRenderer::new()),
        settings.render,
    );
    let pipeline_settings = PipelineSettings::new(&settings.output_dir)
        .with_retry(settings.retry.clone())
        .with_request_timeout(settings.http.request_timeout)
        .with_proxy(settings.http.proxy.clone());

    let interrupted = Arc::new(AtomicBool::new(false));
    let pipeline = Arc::new(
        Pipeline::new(
            Arc::new(cache),
            strategies,
            DocumentFetcher::new(client),
            pipeline_settings,
        )
        .with_normalizer(normalizer)
        .with_interrupt(Arc::clone(&interrupted)),
    );

    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight items");
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let total = entries.len();
    let progress = ProgressUi::start(use_spinner, pipeline.stats(), total);

    let runner = BatchRunner::new(Arc::clone(&pipeline), settings.concurrency)?;
    let result = runner.run(entries).await;
    progress.finish().await;

    let summary = result.context("Batch aborted")?;
    print_summary(&summary, total);

    if summary.was_interrupted() || interrupted.load(Ordering::SeqCst) {
        warn!(
            saved = summary.saved,
            interrupted = summary.interrupted,
            "Interrupted. Run again to resume."
        );
        return Ok(ProcessExit::Interrupted);
    }
    Ok(ProcessExit::Success)
}

fn print_summary(summary: &BatchSummary, total: usize) {
    println!(
        "{total} items: {} saved, {} already done, {} not found, {} rejected ({} retries)",
        summary.saved, summary.skipped, summary.failed, summary.rejected, summary.retried
    );
}
