//! Per-item processing: normalize, dedup, resolve, download, record.
//!
//! [`Pipeline::process`] takes one raw input line through the whole chain and returns an
//! [`Outcome`]. Every network operation runs under the shared [`RetryPolicy`]; page fetch
//! and each binary fetch get their own attempt budget. Exactly one cache record is written
//! per item that reaches a terminal result, and only after its files are in place.
//!
//! [`BatchRunner`] drives a [`Pipeline`] over a whole input list with bounded parallelism.

mod outcome;
mod runner;

pub use outcome::{FailureKind, Outcome, PipelineError, SkipReason};
pub use runner::{BatchRunner, BatchStats, BatchSummary, DEFAULT_CONCURRENCY, RunnerError};

use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{CacheOutcome, DedupCache};
use crate::download::{
    DocumentFetcher, DownloadError, FailureType, RetryDecision, RetryPolicy, SavedDocument,
    classify_error, classify_resolve_error,
};
use crate::input::ItemId;
use crate::normalizer::{Normalizer, Rejection};
use crate::resolver::{
    DocumentLink, FetchOptions, PageContent, ResolveError, Resolution, Strategy, StrategySet,
    select_strategy,
};
use crate::user_agent::UserAgentPool;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Run-wide knobs for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory documents are written into. Must exist.
    pub output_dir: PathBuf,
    /// Timeout for each page fetch and each binary fetch.
    pub request_timeout: Duration,
    /// Proxy forwarded to engines that do not share the HTTP client.
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Last error of a retried operation.
#[derive(Debug)]
struct GaveUp<E> {
    error: E,
    attempts: u32,
    exhausted: bool,
}

/// Removes an item id from the in-flight set when processing ends.
struct InFlightClaim<'a> {
    claims: &'a DashSet<ItemId>,
    id: ItemId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.id);
    }
}

/// Resolves and downloads registry items, recording each terminal result once.
pub struct Pipeline {
    normalizer: Normalizer,
    cache: Arc<DedupCache>,
    strategies: StrategySet,
    fetcher: DocumentFetcher,
    user_agents: Arc<UserAgentPool>,
    settings: PipelineSettings,
    in_flight: DashSet<ItemId>,
    interrupt: Arc<AtomicBool>,
    stats: Arc<BatchStats>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategies", &self.strategies)
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with the built-in normalizer rules and user-agent pool.
    #[must_use]
    pub fn new(
        cache: Arc<DedupCache>,
        strategies: StrategySet,
        fetcher: DocumentFetcher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            normalizer: Normalizer::builtin(),
            cache,
            strategies,
            fetcher,
            user_agents: Arc::new(UserAgentPool::builtin()),
            settings,
            in_flight: DashSet::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(BatchStats::default()),
        }
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn with_user_agents(mut self, user_agents: Arc<UserAgentPool>) -> Self {
        self.user_agents = user_agents;
        self
    }

    /// Shares an interrupt flag, typically set from a Ctrl-C handler.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Flag that stops retry loops and further dequeuing once set.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Counters updated as items finish.
    #[must_use]
    pub fn stats(&self) -> Arc<BatchStats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Processes one raw input line.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cache`] when the cache cannot be read or written, and
    /// [`PipelineError::Interrupted`] when the interrupt flag is raised mid-item. Neither
    /// writes a record. Per-item network and extraction failures are not errors; they
    /// come back as [`Outcome::Failed`].
    #[instrument(skip(self), fields(item_id))]
    pub async fn process(&self, source: &str) -> Result<Outcome, PipelineError> {
        if self.is_interrupted() {
            return Err(PipelineError::Interrupted);
        }

        let id = match ItemId::from_source_url(source) {
            Ok(id) => id,
            Err(error) => {
                warn!(url = %source.trim(), error = %error, "skipping input without item id");
                return Ok(Outcome::Skipped(SkipReason::InvalidInput(error.to_string())));
            }
        };
        tracing::Span::current().record("item_id", tracing::field::display(&id));

        let normalized = match self.normalizer.normalize(source) {
            Ok(normalized) => normalized,
            Err(Rejection::DeniedHost { host, url }) => {
                info!(url = %url, host = %host, "skipping denied host");
                return Ok(Outcome::Skipped(SkipReason::Denied(host)));
            }
            Err(rejection) => {
                warn!(url = %source.trim(), reason = %rejection, "skipping rejected URL");
                return Ok(Outcome::Skipped(SkipReason::InvalidInput(rejection.to_string())));
            }
        };

        if !self.in_flight.insert(id.clone()) {
            debug!("item already claimed by another worker");
            return Ok(Outcome::Skipped(SkipReason::InFlight));
        }
        let _claim = InFlightClaim {
            claims: &self.in_flight,
            id: id.clone(),
        };

        if let Some(record) = self.cache.get(&id).await? {
            info!(status = record.outcome.status(), "already downloaded; skipping");
            return Ok(Outcome::Skipped(SkipReason::AlreadyRecorded(Box::new(record))));
        }

        let result = self.resolve_and_download(&id, normalized.as_str()).await?;
        self.record(&id, result).await
    }

    async fn record(&self, id: &ItemId, outcome: Outcome) -> Result<Outcome, PipelineError> {
        let cached = match &outcome {
            Outcome::Saved(paths) => CacheOutcome::Saved(paths.clone()),
            Outcome::Failed { kind, reason } => CacheOutcome::NotFound {
                reason: format!("{kind}: {reason}"),
            },
            Outcome::Skipped(_) => return Ok(outcome),
        };
        if !self.cache.set(id, &cached).await? {
            warn!("a record appeared while the item was in flight; keeping the stored one");
        }
        Ok(outcome)
    }

    async fn resolve_and_download(&self, id: &ItemId, url: &str) -> Result<Outcome, PipelineError> {
        let links = match self.resolve(url).await? {
            Ok(links) => links,
            Err(outcome) => return Ok(outcome),
        };
        debug!(links = links.len(), "resolved document links");

        let mut saved = Vec::new();
        let mut last_failure = None;
        for link in links.urls() {
            let attempt = match self.download(id, link).await {
                Ok(attempt) => attempt,
                Err(error) => {
                    discard_partial_item(&saved).await;
                    return Err(error);
                }
            };
            match attempt {
                Ok(document) => saved.push(document.path),
                Err(gave_up) => {
                    warn!(
                        url = %link,
                        error = %gave_up.error,
                        attempts = gave_up.attempts,
                        "document download failed"
                    );
                    last_failure = Some(gave_up);
                }
            }
        }

        if !saved.is_empty() {
            info!(files = saved.len(), "item saved");
            return Ok(Outcome::Saved(saved));
        }
        Ok(last_failure.map_or_else(
            || Outcome::Failed {
                kind: FailureKind::NoDocumentLink,
                reason: format!("no document link found for {url}"),
            },
            |gave_up| Outcome::Failed {
                kind: if gave_up.exhausted {
                    FailureKind::Exhausted
                } else {
                    FailureKind::Permanent
                },
                reason: gave_up.error.to_string(),
            },
        ))
    }

    /// Fetches and extracts, following at most one next hop through the generic variant.
    async fn resolve(&self, url: &str) -> Result<Result<DocumentLink, Outcome>, PipelineError> {
        let kind = select_strategy(url);
        let strategy = self.strategies.get(kind);
        debug!(strategy = strategy.name(), "selected strategy");

        let page = match self.fetch_page(strategy.as_ref(), url).await? {
            Ok(page) => page,
            Err(gave_up) => return Ok(Err(page_failure(url, &gave_up))),
        };

        match strategy.extract(&page) {
            Resolution::Links(links) => Ok(links_or_miss(links, &page)),
            Resolution::NextHop(next) => {
                debug!(next = %next, "following next hop");
                let generic = self.strategies.generic();
                let page = match self.fetch_page(generic.as_ref(), next.as_str()).await? {
                    Ok(page) => page,
                    Err(gave_up) => return Ok(Err(page_failure(next.as_str(), &gave_up))),
                };
                match generic.extract(&page) {
                    Resolution::Links(links) => Ok(links_or_miss(links, &page)),
                    Resolution::NextHop(again) => {
                        debug!(next = %again, "ignoring second next hop");
                        Ok(links_or_miss(DocumentLink::empty(), &page))
                    }
                }
            }
        }
    }

    async fn fetch_page(
        &self,
        strategy: &dyn Strategy,
        url: &str,
    ) -> Result<Result<PageContent, GaveUp<ResolveError>>, PipelineError> {
        self.with_retry("page", url, classify_resolve_error, || {
            let options = FetchOptions::new(self.user_agents.get_profile())
                .with_timeout(self.settings.request_timeout)
                .with_proxy(self.settings.proxy.clone());
            async move { strategy.fetch(url, &options).await }
        })
        .await
    }

    async fn download(
        &self,
        id: &ItemId,
        url: &Url,
    ) -> Result<Result<SavedDocument, GaveUp<DownloadError>>, PipelineError> {
        self.with_retry("document", url.as_str(), classify_error, || {
            let profile = self.user_agents.get_profile();
            async move {
                self.fetcher
                    .fetch_to_dir(
                        url,
                        id.as_str(),
                        &self.settings.output_dir,
                        &profile.user_agent,
                        self.settings.request_timeout,
                    )
                    .await
            }
        })
        .await
    }

    /// Runs `attempt` until it succeeds, fails permanently, or exhausts the budget.
    ///
    /// The interrupt flag is checked before every sleep.
    async fn with_retry<T, E, F, Fut>(
        &self,
        operation: &'static str,
        url: &str,
        classify: fn(&E) -> FailureType,
        mut attempt: F,
    ) -> Result<Result<T, GaveUp<E>>, PipelineError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = &self.settings.retry;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let error = match attempt().await {
                Ok(value) => return Ok(Ok(value)),
                Err(error) => error,
            };
            let failure_type = classify(&error);
            match policy.should_retry(failure_type, attempts) {
                RetryDecision::Retry { delay, attempt: next } => {
                    if self.is_interrupted() {
                        return Err(PipelineError::Interrupted);
                    }
                    info!(
                        operation,
                        url = %url,
                        error = %error,
                        attempt = next,
                        max_attempts = policy.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying"
                    );
                    self.stats.record_retry();
                    tokio::time::sleep(delay).await;
                    if self.is_interrupted() {
                        return Err(PipelineError::Interrupted);
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(operation, url = %url, attempts, reason = %reason, "giving up");
                    return Ok(Err(GaveUp {
                        error,
                        attempts,
                        exhausted: failure_type.is_retryable(),
                    }));
                }
            }
        }
    }
}

fn links_or_miss(links: DocumentLink, page: &PageContent) -> Result<DocumentLink, Outcome> {
    if links.is_empty() {
        info!(url = %page.final_url, "no document link on page");
        Err(Outcome::Failed {
            kind: FailureKind::NoDocumentLink,
            reason: format!("no document link found on {}", page.final_url),
        })
    } else {
        Ok(links)
    }
}

fn page_failure(url: &str, gave_up: &GaveUp<ResolveError>) -> Outcome {
    warn!(
        url = %url,
        error = %gave_up.error,
        attempts = gave_up.attempts,
        "page fetch failed"
    );
    let kind = match (&gave_up.error, gave_up.exhausted) {
        (ResolveError::Rendering { .. }, _) => FailureKind::Rendering,
        (_, true) => FailureKind::Exhausted,
        (_, false) => FailureKind::Permanent,
    };
    Outcome::Failed {
        kind,
        reason: gave_up.error.to_string(),
    }
}

/// Removes documents already written for an item that was interrupted before being recorded.
async fn discard_partial_item(saved: &[PathBuf]) {
    for path in saved {
        if let Err(error) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %error, "failed to remove partial item file");
        } else {
            debug!(path = %path.display(), "removed file of interrupted item");
        }
    }
}
