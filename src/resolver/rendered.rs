//! Variant for repositories that only expose their links after JavaScript runs.
//!
//! Pages are loaded through a [`PageRenderer`]. The production renderer drives headless
//! Chromium over the DevTools protocol when the `headless` feature is enabled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use super::extract::extract_document_links;
use super::generic::GenericStrategy;
use super::{FetchOptions, PageContent, ResolveError, Resolution, Strategy};

const DEFAULT_SETTLE_MS: u64 = 3000;
const DEFAULT_MAX_SESSIONS: usize = 2;

/// Failures reported by a [`PageRenderer`].
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("page interaction failed: {0}")]
    Page(String),

    #[error("headless rendering is not available in this build")]
    Unavailable,
}

/// One page load request.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub url: &'a str,
    pub user_agent: &'a str,
    pub proxy: Option<&'a str>,
    /// Time to wait after navigation for scripts to populate the DOM.
    pub settle: Duration,
}

/// DOM snapshot after scripts ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub final_url: String,
    pub html: String,
}

/// Loads a page in a scripting-capable engine.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest<'_>) -> Result<RenderedPage, RendererError>;
}

/// Rendering limits for [`RenderedStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub max_sessions: usize,
    pub settle: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

/// Renders the page, then runs generic extraction over the resulting DOM.
///
/// URLs that already are the document are recognized first, without taking a render session.
pub struct RenderedStrategy {
    generic: GenericStrategy,
    renderer: Arc<dyn PageRenderer>,
    sessions: Arc<Semaphore>,
    settle: Duration,
}

impl RenderedStrategy {
    #[must_use]
    pub fn new(
        generic: GenericStrategy,
        renderer: Arc<dyn PageRenderer>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            generic,
            renderer,
            sessions: Arc::new(Semaphore::new(settings.max_sessions.max(1))),
            settle: settings.settle,
        }
    }
}

impl std::fmt::Debug for RenderedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedStrategy")
            .field("available_sessions", &self.sessions.available_permits())
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Strategy for RenderedStrategy {
    fn name(&self) -> &'static str {
        "rendered"
    }

    #[instrument(skip(self, options), fields(strategy = "rendered"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        let requested = Url::parse(url).map_err(|e| ResolveError::invalid_url(url, e.to_string()))?;

        if let Some(page) = self.generic.detect_document(&requested, options).await {
            return Ok(page);
        }

        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| ResolveError::rendering(url, "render session pool closed"))?;

        let request = RenderRequest {
            url,
            user_agent: &options.user_agent.user_agent,
            proxy: options.proxy.as_deref(),
            settle: self.settle,
        };
        let budget = options.timeout + self.settle;
        let rendered = tokio::time::timeout(budget, self.renderer.render(&request))
            .await
            .map_err(|_| ResolveError::rendering(url, "render timed out"))?
            .map_err(|e| ResolveError::rendering(url, e.to_string()))?;

        let final_url = Url::parse(&rendered.final_url).unwrap_or_else(|_| {
            debug!(reported = %rendered.final_url, "renderer reported unparseable URL");
            requested
        });
        Ok(PageContent::html(final_url, rendered.html))
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        Resolution::Links(extract_document_links(page))
    }
}

/// Headless Chromium renderer. Each render launches and closes its own browser.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer;

impl ChromiumRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "headless")]
#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, request: &RenderRequest<'_>) -> Result<RenderedPage, RendererError> {
        use chromiumoxide::browser::{Browser, BrowserConfig};
        use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
        use futures_util::StreamExt;

        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox");
        if let Some(proxy) = request.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        let config = builder.build().map_err(RendererError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RendererError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = async {
            let page = browser.new_page("about:blank").await?;
            page.execute(SetUserAgentOverrideParams::new(request.user_agent))
                .await?;
            page.goto(request.url).await?;
            tokio::time::sleep(request.settle).await;
            let html = page.content().await?;
            let final_url = page
                .url()
                .await?
                .unwrap_or_else(|| request.url.to_string());
            Ok::<_, chromiumoxide::error::CdpError>(RenderedPage { final_url, html })
        }
        .await
        .map_err(|e| RendererError::Page(e.to_string()));

        if let Err(error) = browser.close().await {
            warn!(error = %error, "failed to close headless browser");
        }
        let _ = browser.wait().await;
        events.abort();

        result
    }
}

#[cfg(not(feature = "headless"))]
#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, _request: &RenderRequest<'_>) -> Result<RenderedPage, RendererError> {
        Err(RendererError::Unavailable)
    }
}
