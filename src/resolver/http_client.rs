//! Shared HTTP client construction and request policy.
//!
//! Every strategy and the document fetcher send through one `reqwest::Client` so connection
//! pooling, cookies, proxying and timeouts behave the same for page and binary requests.
//! The browser identity is chosen per request, not per client.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy, RequestBuilder, Response};
use tracing::warn;

use super::ResolveError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Accept header sent with page requests.
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Network settings for the shared client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Explicit outbound proxy. When unset, system and environment proxies apply.
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            proxy: None,
            accept_invalid_certs: false,
        }
    }
}

/// Builds the shared HTTP client.
///
/// # Errors
///
/// Returns [`ResolveError::ClientBuild`] when the proxy is malformed or client construction fails.
pub fn build_http_client(config: &HttpClientConfig) -> Result<Client, ResolveError> {
    let initial = try_build_client(config, false);
    match initial {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy settings.
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(config, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ResolveError::client_build(
                    "client construction panicked while initializing networking",
                )),
                Err(BuildClientFailure::Build(error)) => {
                    Err(ResolveError::client_build(error.to_string()))
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ResolveError::client_build(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    config: &HttpClientConfig,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(config);
        if let Some(proxy) = config.proxy.as_deref() {
            let proxy = Proxy::all(proxy).map_err(BuildClientFailure::Build)?;
            builder = builder.proxy(proxy);
        } else if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(config: &HttpClientConfig) -> ClientBuilder {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .cookie_store(true)
        .gzip(true)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Adds the per-request identity and timeout to a page request.
#[must_use]
pub fn page_request(request: RequestBuilder, user_agent: &str, timeout: Duration) -> RequestBuilder {
    request
        .header(USER_AGENT, user_agent)
        .header(ACCEPT, HTML_ACCEPT)
        .timeout(timeout)
}

/// Sends a request, mapping transport failures and non-success statuses into [`ResolveError`].
///
/// # Errors
///
/// Returns [`ResolveError::Timeout`], [`ResolveError::Network`], or [`ResolveError::HttpStatus`].
pub async fn send_checked(request: RequestBuilder, url: &str) -> Result<Response, ResolveError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ResolveError::timeout(url)
        } else {
            ResolveError::network(url, e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::http_status(url, status.as_u16()));
    }
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_with_defaults_succeeds() {
        assert!(build_http_client(&HttpClientConfig::default()).is_ok());
    }

    #[test]
    fn test_build_http_client_rejects_malformed_proxy() {
        let config = HttpClientConfig {
            proxy: Some("http://proxy host:notaport".to_string()),
            ..HttpClientConfig::default()
        };
        let error = build_http_client(&config).unwrap_err();
        assert!(matches!(error, ResolveError::ClientBuild { .. }));
    }

    #[test]
    fn test_build_http_client_accepts_explicit_proxy() {
        let config = HttpClientConfig {
            proxy: Some("http://127.0.0.1:3128".to_string()),
            ..HttpClientConfig::default()
        };
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_send_checked_maps_status_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/missing", server.uri());
        let error = send_checked(client.get(&url), &url).await.unwrap_err();
        assert!(matches!(error, ResolveError::HttpStatus { status: 404, .. }));
    }
}
