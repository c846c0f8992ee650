//! Bounded-parallel batch processing over a [`Pipeline`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use super::{Outcome, Pipeline, PipelineError};
use crate::cache::CacheError;
use crate::input::SourceEntry;

const MIN_CONCURRENCY: usize = 1;
const MAX_CONCURRENCY: usize = 100;

/// Default number of items processed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that end a batch.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    /// Cache storage failed; the batch stopped dequeuing.
    #[error("batch aborted: {0}")]
    Cache(#[from] CacheError),

    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Live counters for a batch. Updated from worker tasks, read by progress displays.
#[derive(Debug, Default)]
pub struct BatchStats {
    saved: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    rejected: AtomicUsize,
    retried: AtomicUsize,
    interrupted: AtomicUsize,
}

impl BatchStats {
    pub(crate) fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn record_outcome(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Saved(_) => &self.saved,
            Outcome::Failed { .. } => &self.failed,
            Outcome::Skipped(reason) if reason.is_rejection() => &self.rejected,
            Outcome::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::SeqCst);
    }

    /// Items that reached a result so far.
    #[must_use]
    pub fn finished(&self) -> usize {
        let summary = self.snapshot();
        summary.saved + summary.skipped + summary.failed + summary.rejected
    }

    #[must_use]
    pub fn snapshot(&self) -> BatchSummary {
        BatchSummary {
            saved: self.saved.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            interrupted: self.interrupted.load(Ordering::SeqCst),
        }
    }
}

/// Counts at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Items with at least one document written.
    pub saved: usize,
    /// Items already recorded, or claimed by another worker.
    pub skipped: usize,
    /// Items recorded as not found.
    pub failed: usize,
    /// Lines with no item id, invalid URLs, and denied hosts.
    pub rejected: usize,
    /// Retry sleeps taken across all network operations.
    pub retried: usize,
    /// Items abandoned because of an interrupt.
    pub interrupted: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted > 0
    }
}

/// Processes input entries with at most `concurrency` items in flight.
#[derive(Debug)]
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl BatchRunner {
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidConcurrency`] outside `1..=100`.
    pub fn new(pipeline: Arc<Pipeline>, concurrency: usize) -> Result<Self, RunnerError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(RunnerError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Runs every entry, spawning one task per item.
    ///
    /// Stops dequeuing when the pipeline's interrupt flag is raised or the cache fails.
    /// Per-item failures are counted and never end the batch.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Cache`] with the first cache failure once all started tasks
    /// have finished.
    #[instrument(skip(self, entries), fields(items = entries.len(), concurrency = self.concurrency))]
    pub async fn run(&self, entries: Vec<SourceEntry>) -> Result<BatchSummary, RunnerError> {
        let stats = self.pipeline.stats();
        let interrupt = self.pipeline.interrupt_flag();
        let halted = Arc::new(AtomicBool::new(false));
        let fatal: Arc<Mutex<Option<CacheError>>> = Arc::new(Mutex::new(None));
        let mut handles = Vec::with_capacity(entries.len());

        info!("starting batch");
        for entry in entries {
            if interrupt.load(Ordering::SeqCst) || halted.load(Ordering::SeqCst) {
                debug!(line = entry.line, "stopping dequeue");
                break;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| RunnerError::SemaphoreClosed)?;

            let pipeline = Arc::clone(&self.pipeline);
            let stats = Arc::clone(&stats);
            let halted = Arc::clone(&halted);
            let fatal = Arc::clone(&fatal);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match pipeline.process(&entry.url).await {
                    Ok(outcome) => {
                        log_outcome(&entry, &outcome);
                        stats.record_outcome(&outcome);
                    }
                    Err(PipelineError::Interrupted) => {
                        debug!(line = entry.line, url = %entry.url, "item interrupted");
                        stats.record_interrupted();
                    }
                    Err(PipelineError::Cache(error)) => {
                        warn!(line = entry.line, url = %entry.url, error = %error, "cache failure");
                        halted.store(true, Ordering::SeqCst);
                        fatal.lock().await.get_or_insert(error);
                    }
                }
            }));
        }

        debug!(task_count = handles.len(), "waiting for items to finish");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "item task panicked");
            }
        }

        if let Some(error) = fatal.lock().await.take() {
            return Err(RunnerError::Cache(error));
        }

        let summary = stats.snapshot();
        info!(
            saved = summary.saved,
            skipped = summary.skipped,
            failed = summary.failed,
            rejected = summary.rejected,
            retried = summary.retried,
            interrupted = summary.interrupted,
            "batch complete"
        );
        Ok(summary)
    }
}

fn log_outcome(entry: &SourceEntry, outcome: &Outcome) {
    match outcome {
        Outcome::Saved(paths) => {
            info!(line = entry.line, url = %entry.url, files = paths.len(), "saved");
        }
        Outcome::Skipped(reason) => {
            debug!(line = entry.line, url = %entry.url, reason = reason.label(), "skipped");
        }
        Outcome::Failed { kind, reason } => {
            warn!(line = entry.line, url = %entry.url, kind = %kind, reason = %reason, "not found");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::DedupCache;
    use crate::db::Database;
    use crate::download::{DocumentFetcher, RetryPolicy};
    use crate::input::parse_source_list;
    use crate::pipeline::{PipelineSettings, SkipReason};
    use crate::resolver::{
        ChromiumRenderer, HttpClientConfig, RenderSettings, StrategySet, build_http_client,
    };

    async fn pipeline(dir: &std::path::Path) -> Arc<Pipeline> {
        let client = build_http_client(&HttpClientConfig::default()).unwrap();
        let cache = Arc::new(DedupCache::new(Database::new_in_memory().await.unwrap()));
        let strategies = StrategySet::new(
            client.clone(),
            Arc::new(ChromiumRenderer::new()),
            RenderSettings::default(),
        );
        let settings = PipelineSettings::new(dir)
            .with_retry(RetryPolicy::new(1, Duration::ZERO, Duration::ZERO));
        Arc::new(Pipeline::new(cache, strategies, DocumentFetcher::new(client), settings))
    }

    #[tokio::test]
    async fn test_runner_rejects_invalid_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        assert!(matches!(
            BatchRunner::new(Arc::clone(&pipeline), 0),
            Err(RunnerError::InvalidConcurrency { value: 0 })
        ));
        assert!(BatchRunner::new(pipeline, 101).is_err());
    }

    #[tokio::test]
    async fn test_runner_counts_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let runner = BatchRunner::new(pipeline(dir.path()).await, 2).unwrap();
        let entries = parse_source_list(
            "# registry export\nhttps://r.org/no-id\nhttps://dx.doi.org/view?id=3\n\nnot a url=12\n",
        );

        let summary = runner.run(entries).await.unwrap();
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.saved + summary.failed + summary.skipped, 0);
        assert!(!summary.was_interrupted());
    }

    #[tokio::test]
    async fn test_runner_stops_dequeuing_after_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let runner = BatchRunner::new(pipeline(dir.path()).await, 1).unwrap();
        runner.pipeline().interrupt_flag().store(true, Ordering::SeqCst);

        let summary = runner
            .run(parse_source_list("https://r.org/view?id=1\n"))
            .await
            .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn test_stats_classify_outcomes() {
        let stats = BatchStats::default();
        stats.record_outcome(&Outcome::Saved(vec![]));
        stats.record_outcome(&Outcome::Skipped(SkipReason::InFlight));
        stats.record_outcome(&Outcome::Skipped(SkipReason::Denied("x".into())));
        stats.record_retry();
        let summary = stats.snapshot();
        assert_eq!((summary.saved, summary.skipped, summary.rejected), (1, 1, 1));
        assert_eq!(summary.retried, 1);
        assert_eq!(stats.finished(), 3);
    }
}
