//! Crawl of one blog: enumerate every page, then fetch every new item.
//!
//! Both phases run on a bounded pool sized by the blog's fair share of
//! `parallel_images`, recomputed from the live active-blog count when each
//! phase starts. Every task passes the session's pause gate before it
//! starts a transfer and checks for cancellation right after. It keeps its
//! ticket until the request is answered, so a returned pause has no
//! request still about to go out.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use super::counters::{CrawlCounters, percentage};
use super::enumerator::{EnumerationOptions, PageStats, PostEnumerator};
use super::error::CrawlError;
use super::item::{Category, FetchableItem, ItemPayload};
use crate::blog::{BlogHandle, BlogStore, StoreError};
use crate::config::CrawlSettings;
use crate::download::{DownloadOutcome, ItemDownloader, ThrottledTransport};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::queue::{CrawlQueue, QueueItem};
use crate::session::CrawlSession;
use crate::source::{PAGE_SIZE, PostSource};

/// Collaborators shared by every job of a service.
#[derive(Clone)]
pub struct CrawlContext {
    pub source: Arc<dyn PostSource>,
    pub transport: ThrottledTransport,
    pub store: Arc<dyn BlogStore>,
    pub settings: Arc<CrawlSettings>,
    pub progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlContext")
            .field("transport", &self.transport)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Item transfer statistics of one run.
#[derive(Debug, Default)]
pub struct ItemStats {
    downloaded: AtomicUsize,
    already_have: AtomicUsize,
    failed: AtomicUsize,
}

impl ItemStats {
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn already_have(&self) -> usize {
        self.already_have.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Summary of a completed crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlogCrawlReport {
    /// Pages requested from the source.
    pub pages: u32,
    /// Media and text items discovered across all pages.
    pub total_count: u32,
    /// Items skipped before transfer because the ledger already had them.
    pub known: usize,
    pub downloaded: usize,
    pub already_have: usize,
    pub failed: usize,
    /// Final progress percentage.
    pub progress: u8,
}

/// One run of a blog crawl, owned by the worker that claimed the blog.
#[derive(Debug)]
pub struct BlogCrawlJob {
    ctx: CrawlContext,
    queue: CrawlQueue,
    item: QueueItem,
    session: CrawlSession,
}

impl BlogCrawlJob {
    #[must_use]
    pub fn new(ctx: CrawlContext, queue: CrawlQueue, item: QueueItem, session: CrawlSession) -> Self {
        Self {
            ctx,
            queue,
            item,
            session,
        }
    }

    /// Runs the crawl and persists the blog, whatever the outcome.
    ///
    /// The blog is marked dirty and saved before any network traffic. On
    /// return it is clean again; a completed run also stamps the last
    /// complete crawl time.
    ///
    /// # Errors
    ///
    /// - [`CrawlError::Cancelled`] when the session is stopped; partial
    ///   counts and ledger entries are saved first.
    /// - [`CrawlError::Source`] when the blog's metadata cannot be read.
    /// - [`CrawlError::Store`] when the record cannot be saved. The failure
    ///   is also reported to the progress sink.
    #[instrument(skip(self), fields(blog = %self.item.name()))]
    pub async fn run(self) -> Result<BlogCrawlReport, CrawlError> {
        let blog = self.item.blog().clone();
        blog.update(|b| b.dirty = true);
        if let Err(e) = self.ctx.store.save(&blog.snapshot()).await {
            blog.update(|b| b.dirty = false);
            self.report_store_failure(blog.name(), &e);
            return Err(e.into());
        }

        let result = self.crawl(&blog).await;

        let completed = result.is_ok();
        blog.update(|b| {
            if completed {
                b.last_complete_crawl = Some(Utc::now());
            }
            b.clear_preview();
            b.dirty = false;
        });
        let saved = self.ctx.store.save(&blog.snapshot()).await;
        match &saved {
            Ok(()) => self.ctx.progress.report(ProgressUpdate::finished(blog.name())),
            Err(e) => self.report_store_failure(blog.name(), e),
        }

        match (result, saved) {
            (Ok(report), Ok(())) => {
                info!(
                    downloaded = report.downloaded,
                    failed = report.failed,
                    progress = report.progress,
                    "crawl complete"
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), _) => Err(e),
        }
    }

    fn report_store_failure(&self, name: &str, error: &StoreError) {
        error!(error = %error, "failed to save blog");
        self.ctx.progress.report(ProgressUpdate::failed(name, error));
    }

    fn fair_share(&self) -> usize {
        let active = self.queue.active_count().max(1);
        (self.ctx.settings.parallel_images / active).max(1)
    }

    fn ensure_running(&self) -> Result<(), CrawlError> {
        if self.session.is_cancelled() {
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn crawl(&self, blog: &BlogHandle) -> Result<BlogCrawlReport, CrawlError> {
        let ticket = self.session.pause_token().checkpoint().await;
        self.ensure_running()?;

        let (url, options) =
            blog.read(|b| (b.url.clone(), EnumerationOptions::for_blog(b, &self.ctx.settings)));
        let enumerator = PostEnumerator::new(Arc::clone(&self.ctx.source), options);

        let meta = enumerator.fetch_meta(&url).await;
        drop(ticket);
        let meta = match meta {
            Ok(meta) => meta,
            Err(e) => {
                blog.update(|b| b.online = false);
                return Err(CrawlError::source_failed(blog.name(), e));
            }
        };
        blog.update(|b| {
            b.title.clone_from(&meta.title);
            b.description.clone_from(&meta.description);
            b.online = true;
        });

        let pages = PostEnumerator::page_count(meta.total_posts);
        let (mut items, stats) = self
            .enumerate(blog.name(), &enumerator, &url, pages, meta.total_posts)
            .await?;

        blog.update(|b| {
            b.stats.posts = meta.total_posts;
            b.stats.photos = stats.photos;
            b.stats.videos = stats.videos;
            b.stats.audios = stats.audios;
            b.stats.texts = stats.texts;
            b.stats.quotes = stats.quotes;
            b.stats.links = stats.links;
            b.stats.conversations = stats.conversations;
            b.stats.total_count = stats.total_downloads;
        });

        let discovered = items.len();
        items.retain(|item| !blog.ledger().contains(item.identifier()));
        let known = discovered - items.len();
        debug!(discovered, known, "filtered items against ledger");

        let counters = Arc::new(CrawlCounters::seeded(
            &blog.read(|b| b.stats.downloaded),
        ));
        let tracker = Arc::new(ProgressTracker {
            blog: blog.clone(),
            item: self.item.clone(),
            counters: Arc::clone(&counters),
            total_count: stats.total_downloads,
            progress: Arc::clone(&self.ctx.progress),
            enable_preview: self.ctx.settings.enable_preview,
            order: Mutex::new(()),
        });
        tracker.publish_progress();

        let item_stats = self.download_items(blog, items, &tracker).await?;

        Ok(BlogCrawlReport {
            pages,
            total_count: stats.total_downloads,
            known,
            downloaded: item_stats.downloaded(),
            already_have: item_stats.already_have(),
            failed: item_stats.failed(),
            progress: blog.read(|b| b.progress),
        })
    }

    /// Harvests pages `0..pages`. A page that fails is logged and skipped.
    async fn enumerate(
        &self,
        name: &str,
        enumerator: &PostEnumerator,
        url: &str,
        pages: u32,
        total_posts: u32,
    ) -> Result<(Vec<FetchableItem>, PageStats), CrawlError> {
        let semaphore = Arc::new(Semaphore::new(self.fair_share()));
        let evaluated = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for page in 0..pages {
            if self.session.is_cancelled() {
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let enumerator = enumerator.clone();
            let url = url.to_string();
            let name = name.to_string();
            let session = self.session.clone();
            let evaluated = Arc::clone(&evaluated);
            let progress = Arc::clone(&self.ctx.progress);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let ticket = session.pause_token().checkpoint().await;
                if session.is_cancelled() {
                    return None;
                }

                let harvest = enumerator.harvest_page(&url, page).await;
                drop(ticket);
                let harvest = match harvest {
                    Ok(harvest) => Some(harvest),
                    Err(e) => {
                        warn!(page, error = %e, "dropping page");
                        None
                    }
                };

                let done = evaluated.fetch_add(1, Ordering::SeqCst) + 1;
                let posts = done.saturating_mul(PAGE_SIZE).min(total_posts);
                progress.report(ProgressUpdate::evaluated(&name, posts, total_posts));
                harvest
            }));
        }

        let mut items = Vec::new();
        let mut stats = PageStats::default();
        for handle in handles {
            match handle.await {
                Ok(Some(harvest)) => {
                    items.extend(harvest.items);
                    stats += harvest.stats;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "page task panicked"),
            }
        }

        self.ensure_running()?;
        debug!(pages, items = items.len(), "enumeration complete");
        Ok((items, stats))
    }

    async fn download_items(
        &self,
        blog: &BlogHandle,
        items: Vec<FetchableItem>,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<Arc<ItemStats>, CrawlError> {
        let blog_dir: PathBuf = blog.read(|b| b.download_dir(&self.ctx.settings.download_root));
        let downloader =
            ItemDownloader::new(self.ctx.transport.clone(), blog_dir, blog.ledger().clone());
        let semaphore = Arc::new(Semaphore::new(self.fair_share()));
        let stats = Arc::new(ItemStats::default());
        let mut handles = Vec::new();

        for item in items {
            if self.session.is_cancelled() {
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let downloader = downloader.clone();
            let session = self.session.clone();
            let stats = Arc::clone(&stats);
            let tracker = Arc::clone(tracker);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let ticket = session.pause_token().checkpoint().await;
                if session.is_cancelled() {
                    return;
                }

                match downloader.download(&item, ticket).await {
                    Ok(outcome) => {
                        if outcome == DownloadOutcome::AlreadyHave {
                            stats.already_have.fetch_add(1, Ordering::SeqCst);
                        } else {
                            stats.downloaded.fetch_add(1, Ordering::SeqCst);
                        }
                        tracker.record(&item, &outcome);
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            category = %item.category,
                            post_id = %item.post_id,
                            local = e.is_local(),
                            error = %e,
                            "item transfer failed"
                        );
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
            }
        }

        self.ensure_running()?;
        Ok(stats)
    }
}

/// Serializes counter snapshots and progress reports so that reported
/// percentages never go backwards.
struct ProgressTracker {
    blog: BlogHandle,
    item: QueueItem,
    counters: Arc<CrawlCounters>,
    total_count: u32,
    progress: Arc<dyn ProgressSink>,
    enable_preview: bool,
    order: Mutex<()>,
}

impl ProgressTracker {
    fn record(&self, item: &FetchableItem, outcome: &DownloadOutcome) {
        self.counters.record(item.category);

        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = self.counters.snapshot();
        let percent = percentage(counts.total, self.total_count);
        self.blog.update(|b| {
            b.stats.downloaded = counts;
            b.progress = percent;
            if !self.enable_preview {
                return;
            }
            match (item.category, outcome.path()) {
                (Category::Photo, Some(path)) => b.last_downloaded_photo = Some(path.to_path_buf()),
                (Category::Video, Some(path)) => b.last_downloaded_video = Some(path.to_path_buf()),
                _ => {}
            }
        });
        self.item.set_progress(percent);
        self.progress.report(ProgressUpdate::downloading(
            self.blog.name(),
            percent,
            item_label(item, outcome),
        ));
    }

    fn publish_progress(&self) {
        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        let percent = percentage(self.counters.total(), self.total_count);
        self.blog.update(|b| b.progress = percent);
        self.item.set_progress(percent);
    }
}

fn item_label(item: &FetchableItem, outcome: &DownloadOutcome) -> String {
    match (&item.payload, outcome.path().and_then(|p| p.file_name())) {
        (ItemPayload::Url(_), Some(file_name)) => file_name.to_string_lossy().into_owned(),
        _ => format!("Post: {}", item.post_id),
    }
}
