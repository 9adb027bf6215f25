//! Throttled HTTP transport shared by page fetches and item transfers.
//!
//! [`ThrottledTransport`] wraps a pooled `reqwest` client. Every response
//! body is streamed chunk by chunk through a [`Throttle`](super::Throttle)
//! so each logical transfer stays within its share of the bandwidth cap.
//!
//! The configured timeout bounds every request up to its response headers.
//! In-memory fetches are bounded as a whole; file transfers only between
//! chunks, since a throttled file may legitimately take longer.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, USER_AGENT};
use super::error::TransferError;
use super::throttle::{BandwidthLimit, Throttle};
use crate::config::CrawlSettings;

/// HTTP transport with per-transfer bandwidth throttling.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use blogcrawl_core::download::{BandwidthLimit, ThrottledTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = ThrottledTransport::new(Duration::from_secs(60), BandwidthLimit::unlimited())?;
/// let body = transport.fetch_text("https://staff.tumblr.com/api/read?num=1").await?;
/// println!("{} bytes", body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ThrottledTransport {
    client: Client,
    timeout: Duration,
    limit: BandwidthLimit,
}

impl ThrottledTransport {
    /// Creates a transport with the given request timeout and bandwidth share.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip(limit), fields(limit_bps = ?limit.bytes_per_sec()))]
    pub fn new(timeout: Duration, limit: BandwidthLimit) -> Result<Self, TransferError> {
        let connect_timeout = timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(timeout)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(TransferError::ClientBuild)?;
        Ok(Self {
            client,
            timeout,
            limit,
        })
    }

    /// Builds the transport from crawl settings: `timeout_secs` for the
    /// request timeout and `bandwidth_kbps / parallel_images` per transfer.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientBuild`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &CrawlSettings) -> Result<Self, TransferError> {
        Self::new(
            Duration::from_secs(settings.timeout_secs),
            BandwidthLimit::from_settings(settings.bandwidth_kbps, settings.parallel_images),
        )
    }

    /// Returns the per-transfer bandwidth share.
    #[must_use]
    pub fn limit(&self) -> BandwidthLimit {
        self.limit
    }

    /// Fetches a URL and returns its body decoded as UTF-8 (lossy).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on invalid URL, network failure, timeout or
    /// non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, TransferError> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetches a URL into memory.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on invalid URL, network failure, timeout or
    /// non-success status.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransferError> {
        match tokio::time::timeout(self.timeout, self.read_body(url)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout {
                url: url.to_string(),
            }),
        }
    }

    async fn read_body(&self, url: &str) -> Result<Vec<u8>, TransferError> {
        let response = self.request(url).await?;
        let mut throttle = self.limit.start();
        let mut stream = response.bytes_stream();
        let mut body = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferError::network(url, e))?;
            body.extend_from_slice(&chunk);
            throttle.consume(chunk.len()).await;
        }

        debug!(bytes = body.len(), "fetched body");
        Ok(body)
    }

    /// Streams a URL to exactly `destination`, creating the parent directory
    /// if needed and replacing any existing file. A partially written file is
    /// removed when the transfer fails.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on invalid URL, network failure, timeout,
    /// non-success status or filesystem failure.
    #[instrument(skip(self, destination), fields(url = %url, path = %destination.display()))]
    pub async fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let response = self.request(url).await?;
        self.save_response(response, url, destination).await
    }

    /// Writes an already received response to `destination`, with the same
    /// directory creation and cleanup as [`Self::download_to_file`].
    pub(crate) async fn save_response(
        &self,
        response: reqwest::Response,
        url: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }

        let mut file = File::create(destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;

        let result = stream_to_file(&mut file, response, url, destination, self.limit.start()).await;
        if result.is_err() {
            debug!("cleaning up partial file after error");
            let _ = tokio::fs::remove_file(destination).await;
        }
        result
    }

    /// Sends a GET and waits for a success status. The body is not read.
    pub(crate) async fn request(&self, url: &str) -> Result<reqwest::Response, TransferError> {
        Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;

        let response = match tokio::time::timeout(self.timeout, self.client.get(url).send()).await
        {
            Ok(sent) => sent.map_err(|e| TransferError::network(url, e))?,
            Err(_) => {
                return Err(TransferError::Timeout {
                    url: url.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

/// Streams a response body to file through the throttle, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    mut throttle: Throttle,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransferError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
        throttle.consume(chunk.len()).await;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::{localhost_unavailable, start_mock_server_or_skip};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn transport() -> ThrottledTransport {
        ThrottledTransport::new(Duration::from_secs(5), BandwidthLimit::unlimited()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_text_success() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/read"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<tumblr/>"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/api/read", mock_server.uri());
        let body = transport().fetch_text(&url).await.unwrap();
        assert_eq!(body, "<tumblr/>");
    }

    #[tokio::test]
    async fn test_fetch_404_is_http_status() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/missing", mock_server.uri());
        match transport().fetch_bytes(&url).await {
            Err(TransferError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_url_rejected_before_request() {
        let temp_dir = TempDir::new().unwrap();
        let transport = transport();
        let result = tokio_test::block_on(
            transport.download_to_file("not-a-valid-url", &temp_dir.path().join("x.jpg")),
        );
        assert!(matches!(result, Err(TransferError::InvalidUrl { .. })));
        assert!(!temp_dir.path().join("x.jpg").exists());
    }

    #[tokio::test]
    async fn test_download_to_file_creates_parent_and_writes_body() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/media/tumblr_abc_1280.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA"))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("someblog").join("tumblr_abc_1280.jpg");
        let url = format!("{}/media/tumblr_abc_1280.jpg", mock_server.uri());

        let written = transport().download_to_file(&url, &destination).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&destination).unwrap(), b"JPEGDATA");
    }

    #[tokio::test]
    async fn test_download_timeout_leaves_no_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let transport =
            ThrottledTransport::new(Duration::from_millis(300), BandwidthLimit::unlimited())
                .unwrap();
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("slow.jpg");
        let url = format!("{}/slow.jpg", mock_server.uri());

        let result = transport.download_to_file(&url, &destination).await;

        assert!(
            matches!(
                result,
                Err(TransferError::Timeout { .. } | TransferError::Network { .. })
            ),
            "expected timeout, got {result:?}"
        );
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_page_fetch_times_out_on_trickling_body() {
        use tokio::io::AsyncReadExt;

        if localhost_unavailable() {
            return;
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n";
            if socket.write_all(head).await.is_err() {
                return;
            }
            // Each byte arrives well within the read timeout.
            for _ in 0..100 {
                if socket.write_all(b"x").await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let transport =
            ThrottledTransport::new(Duration::from_millis(800), BandwidthLimit::unlimited())
                .unwrap();
        let started = std::time::Instant::now();
        let result = transport.fetch_text(&format!("http://{addr}/api/read")).await;

        assert!(
            matches!(result, Err(TransferError::Timeout { .. })),
            "expected timeout, got {result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_from_settings_applies_bandwidth_share() {
        let settings = CrawlSettings {
            bandwidth_kbps: 400,
            parallel_images: 4,
            ..CrawlSettings::default()
        };
        let transport = ThrottledTransport::from_settings(&settings).unwrap();
        assert_eq!(transport.limit().bytes_per_sec(), Some(102_400));
    }
}
