//! Binary document retrieval: one GET, streamed to a temporary file, renamed into place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, USER_AGENT};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::content_type::{ContentKind, classify_content_type, document_extension};
use super::filename::{document_filename, partial_path, resolve_unique_path};
use super::DownloadError;

/// A document written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub path: PathBuf,
    pub bytes: u64,
    /// URL the bytes came from, after redirects.
    pub source_url: Url,
}

/// Fetches document binaries over the shared HTTP client.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
}

impl DocumentFetcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Downloads `url` into `output_dir` as `{item_id}-{server name}.{ext}`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on transport failure, non-success status, a non-document
    /// content type, a truncated body, or a local write failure. No partial file is left behind.
    #[instrument(skip(self, user_agent, timeout), fields(url = %url, item_id = item_id))]
    pub async fn fetch_to_dir(
        &self,
        url: &Url,
        item_id: &str,
        output_dir: &Path,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<SavedDocument, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url.as_str()));
        }

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url.as_str())
                } else {
                    DownloadError::network(url.as_str(), e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        let final_url = response.url().clone();
        let content_type = header_str(&response, CONTENT_TYPE);
        let extension = match classify_content_type(content_type.as_deref()) {
            ContentKind::Document(ext) => ext,
            ContentKind::Unlabeled => document_extension(final_url.path()).unwrap_or("pdf"),
            ContentKind::Other => {
                return Err(DownloadError::unsupported_content_type(
                    final_url.as_str(),
                    content_type.unwrap_or_default(),
                ));
            }
        };

        let disposition = header_str(&response, CONTENT_DISPOSITION);
        let filename = document_filename(item_id, disposition.as_deref(), &final_url, extension);
        let final_path = resolve_unique_path(output_dir, &filename);
        let part_path = partial_path(&final_path);
        debug!(path = %final_path.display(), "resolved output path");

        let expected_bytes = response.content_length();
        let written = write_partial(response, &part_path, final_url.as_str()).await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(error);
            }
        };

        if let Some(expected) = expected_bytes
            && expected != bytes
        {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::integrity(final_path, expected, bytes));
        }

        if let Err(error) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::io(final_path, error));
        }

        info!(path = %final_path.display(), bytes, "document saved");
        Ok(SavedDocument {
            path: final_path,
            bytes,
            source_url: final_url,
        })
    }
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn write_partial(
    response: reqwest::Response,
    part_path: &Path,
    url: &str,
) -> Result<u64, DownloadError> {
    let file = File::create(part_path)
        .await
        .map_err(|e| DownloadError::io(part_path, e))?;
    stream_to_file(file, response, url, part_path).await
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::resolver::{HttpClientConfig, build_http_client};

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/113.0";

    fn fetcher() -> DocumentFetcher {
        DocumentFetcher::new(build_http_client(&HttpClientConfig::default()).unwrap())
    }

    fn url(server: &MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{route}", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_pdf_writes_named_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/f.pdf"))
            .and(header("user-agent", UA))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4 body".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let saved = fetcher()
            .fetch_to_dir(&url(&server, "/files/f.pdf"), "42", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(saved.path, dir.path().join("42-f.pdf"));
        assert_eq!(saved.bytes, 13);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"%PDF-1.4 body");
        assert!(!partial_path(&saved.path).exists());
    }

    #[tokio::test]
    async fn test_fetch_uses_content_disposition_and_content_type_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/msword")
                    .insert_header("content-disposition", "attachment; filename=\"relatorio\"")
                    .set_body_bytes(b"doc".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let saved = fetcher()
            .fetch_to_dir(&url(&server, "/download.php"), "7", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(saved.path, dir.path().join("7-relatorio.doc"));
    }

    #[tokio::test]
    async fn test_fetch_octet_stream_falls_back_to_suffix_then_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"bin".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let saved = fetcher()
            .fetch_to_dir(&url(&server, "/get"), "3", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(saved.path, dir.path().join("3-get.pdf"));
    }

    #[tokio::test]
    async fn test_fetch_html_is_rejected_without_leaving_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html>login</html>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let error = fetcher()
            .fetch_to_dir(&url(&server, "/login"), "1", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(error, DownloadError::UnsupportedContentType { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let error = fetcher()
            .fetch_to_dir(&url(&server, "/f.pdf"), "1", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(error, DownloadError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let error = fetcher()
            .fetch_to_dir(&url(&server, "/f.pdf"), "1", dir.path(), UA, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(error, DownloadError::Timeout { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_name_collision_gets_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"x".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("9-f.pdf"), b"existing").unwrap();
        let saved = fetcher()
            .fetch_to_dir(&url(&server, "/f.pdf"), "9", dir.path(), UA, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(saved.path, dir.path().join("9-f_1.pdf"));
        assert_eq!(std::fs::read(dir.path().join("9-f.pdf")).unwrap(), b"existing");
    }
}
