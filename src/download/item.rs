//! Transfer of a single discovered item, deduplicated through the ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::error::TransferError;
use super::filename::{audio_filename, filename_from_url};
use super::transport::ThrottledTransport;
use crate::blog::{Claim, LinkLedger};
use crate::crawl::{Category, FetchableItem, ItemPayload};
use crate::session::StartTicket;

/// What happened to an item handed to [`ItemDownloader::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The identifier was already in the ledger (or being fetched); nothing
    /// was transferred.
    AlreadyHave,
    /// The item was fetched and its identifier committed.
    Downloaded { path: PathBuf },
}

impl DownloadOutcome {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::AlreadyHave => None,
            Self::Downloaded { path } => Some(path),
        }
    }
}

/// Fetches the items of one blog into its download directory.
///
/// Binary items are streamed to a file named after the URL (audio after the
/// post id). Text items are appended as one line to their category file;
/// appends to the same file are serialized.
#[derive(Debug, Clone)]
pub struct ItemDownloader {
    transport: ThrottledTransport,
    blog_dir: PathBuf,
    ledger: LinkLedger,
    text_sinks: Arc<[Mutex<()>; Category::ALL.len()]>,
}

impl ItemDownloader {
    #[must_use]
    pub fn new(transport: ThrottledTransport, blog_dir: PathBuf, ledger: LinkLedger) -> Self {
        Self {
            transport,
            blog_dir,
            ledger,
            text_sinks: Arc::new(std::array::from_fn(|_| Mutex::new(()))),
        }
    }

    /// Fetches `item` unless its identifier is already known.
    ///
    /// `ticket` is held until the transfer has started: the response headers
    /// have arrived, or the record file is open. A known item releases it
    /// at once.
    ///
    /// The identifier is committed only after the transfer succeeds; on
    /// failure it stays out of the ledger so the next crawl retries it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] when the transfer or the file write fails.
    #[instrument(skip(self, item, ticket), fields(category = %item.category, post_id = %item.post_id))]
    pub async fn download(
        &self,
        item: &FetchableItem,
        ticket: StartTicket,
    ) -> Result<DownloadOutcome, TransferError> {
        let claim = match self.ledger.claim(item.identifier()) {
            Claim::AlreadyHave => {
                debug!("already have item");
                return Ok(DownloadOutcome::AlreadyHave);
            }
            Claim::New(claim) => claim,
        };

        let path = match &item.payload {
            ItemPayload::Url(url) => {
                let file_name = if item.category == Category::Audio {
                    audio_filename(&item.post_id)
                } else {
                    filename_from_url(url)
                };
                let destination = self.blog_dir.join(file_name);
                let response = self.transport.request(url).await?;
                drop(ticket);
                self.transport
                    .save_response(response, url, &destination)
                    .await?;
                destination
            }
            ItemPayload::Record(record) => {
                self.append_record(item.category, record, ticket).await?
            }
        };

        claim.commit();
        Ok(DownloadOutcome::Downloaded { path })
    }

    async fn append_record(
        &self,
        category: Category,
        record: &str,
        ticket: StartTicket,
    ) -> Result<PathBuf, TransferError> {
        let file_name = category.text_file_name().unwrap_or("posts.txt");
        let path = self.blog_dir.join(file_name);

        let _guard = self.text_sinks[category.index()].lock().await;
        tokio::fs::create_dir_all(&self.blog_dir)
            .await
            .map_err(|e| TransferError::io(&self.blog_dir, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        drop(ticket);

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        file.flush().await.map_err(|e| TransferError::io(&path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::download::BandwidthLimit;
    use crate::session::PauseToken;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    async fn ticket() -> StartTicket {
        PauseToken::new().checkpoint().await
    }

    fn downloader(dir: &Path, ledger: LinkLedger) -> ItemDownloader {
        let transport =
            ThrottledTransport::new(Duration::from_secs(5), BandwidthLimit::unlimited()).unwrap();
        ItemDownloader::new(transport, dir.join("someblog"), ledger)
    }

    #[tokio::test]
    async fn test_photo_is_saved_under_url_name_and_committed() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/tumblr_abc_1280.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"IMG"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let ledger = LinkLedger::new();
        let downloader = downloader(temp_dir.path(), ledger.clone());
        let url = format!("{}/tumblr_abc_1280.jpg", mock_server.uri());
        let item = FetchableItem::media(Category::Photo, "1", &url);

        let outcome = downloader.download(&item, ticket().await).await.unwrap();
        let expected = temp_dir.path().join("someblog").join("tumblr_abc_1280.jpg");
        assert_eq!(outcome.path(), Some(expected.as_path()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"IMG");
        assert!(ledger.contains(&url));

        assert_eq!(
            downloader.download(&item, ticket().await).await.unwrap(),
            DownloadOutcome::AlreadyHave
        );
    }

    #[tokio::test]
    async fn test_pause_waits_for_response_headers() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"IMG")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(temp_dir.path(), LinkLedger::new());
        let item = FetchableItem::media(
            Category::Photo,
            "1",
            format!("{}/slow_1280.jpg", mock_server.uri()),
        );
        let token = PauseToken::new();
        let ticket = token.checkpoint().await;

        let started = std::time::Instant::now();
        let task = tokio::spawn(async move { downloader.download(&item, ticket).await });
        token.pause().await;

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_known_identifier_makes_no_request() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = LinkLedger::from_links(["http://127.0.0.1:9/x.jpg".to_string()]);
        let downloader = downloader(temp_dir.path(), ledger);
        let item = FetchableItem::media(Category::Photo, "1", "http://127.0.0.1:9/x.jpg");

        assert_eq!(
            downloader.download(&item, ticket().await).await.unwrap(),
            DownloadOutcome::AlreadyHave
        );
        assert!(!temp_dir.path().join("someblog").exists());
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_ledger_untouched() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let ledger = LinkLedger::new();
        let downloader = downloader(temp_dir.path(), ledger.clone());
        let url = format!("{}/broken.mp4", mock_server.uri());
        let item = FetchableItem::media(Category::Video, "2", &url);

        let result = downloader.download(&item, ticket().await).await;
        assert!(matches!(result, Err(TransferError::HttpStatus { status: 500, .. })));
        assert!(ledger.is_empty());
        assert!(matches!(ledger.claim(&url), Claim::New(_)));
    }

    #[tokio::test]
    async fn test_audio_is_named_after_post_id() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3"))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(temp_dir.path(), LinkLedger::new());
        let url = format!("{}/audio_file?plead=please-dont-download-this", mock_server.uri());
        let item = FetchableItem::media(Category::Audio, "77", url);

        let outcome = downloader.download(&item, ticket().await).await.unwrap();
        assert!(outcome.path().unwrap().ends_with("someblog/77.mp3"));
    }

    #[tokio::test]
    async fn test_text_records_append_one_line_each() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = LinkLedger::new();
        let downloader = downloader(temp_dir.path(), ledger.clone());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let downloader = downloader.clone();
                tokio::spawn(async move {
                    let item = FetchableItem::record(
                        Category::Quote,
                        i.to_string(),
                        format!("Post ID: {i}, Quote"),
                    );
                    downloader.download(&item, ticket().await).await.unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let content =
            std::fs::read_to_string(temp_dir.path().join("someblog").join("quotes.txt")).unwrap();
        assert_eq!(content.lines().count(), 10);
        assert!(content.lines().all(|line| line.starts_with("Post ID: ")));
        assert_eq!(ledger.len(), 10);
    }
}
