//! Shared builders for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thesis_downloader_core::download::RetryPolicy;
use thesis_downloader_core::resolver::{
    ChromiumRenderer, HttpClientConfig, RenderSettings, Strategy, StrategyKind, StrategySet,
    build_http_client,
};
use thesis_downloader_core::{DedupCache, DocumentFetcher, Pipeline, PipelineSettings};

/// Retry policy with no sleeping between attempts.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
}

pub fn client() -> reqwest::Client {
    build_http_client(&HttpClientConfig::default()).expect("client should build")
}

pub fn strategies(client: reqwest::Client) -> StrategySet {
    StrategySet::new(client, Arc::new(ChromiumRenderer::new()), RenderSettings::default())
}

/// Opens (or reopens) the cache file under `state_dir`.
pub async fn open_cache(state_dir: &Path) -> Arc<DedupCache> {
    Arc::new(
        DedupCache::open(&state_dir.join("cache.db"))
            .await
            .expect("cache should open"),
    )
}

/// Pipeline over real strategies with optional per-kind overrides.
pub fn pipeline(
    cache: Arc<DedupCache>,
    output_dir: &Path,
    retry: RetryPolicy,
    overrides: Vec<(StrategyKind, Arc<dyn Strategy>)>,
) -> Pipeline {
    let client = client();
    let strategies = overrides
        .into_iter()
        .fold(strategies(client.clone()), |set, (kind, strategy)| {
            set.with_override(kind, strategy)
        });
    let settings = PipelineSettings::new(output_dir)
        .with_retry(retry)
        .with_request_timeout(Duration::from_secs(5));
    Pipeline::new(cache, strategies, DocumentFetcher::new(client), settings)
}
