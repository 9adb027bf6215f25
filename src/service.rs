//! Entry point for controllers: the blog library, the queue and the
//! scheduler wired to one set of collaborators.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blogcrawl_core::{CrawlService, CrawlSettings, Database, NoopProgress};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(std::path::Path::new("blogcrawl.db")).await?;
//! let service = CrawlService::open(db, CrawlSettings::default(), Arc::new(NoopProgress)).await?;
//! service.add_blog("https://staff.tumblr.com/").await?;
//! service.enqueue("staff")?;
//! service.start()?;
//! service.wait_until_drained().await;
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::blog::{
    BlogHandle, BlogLibrary, BlogStore, EnqueueMode, LibraryError, SqliteBlogStore, StoreError,
};
use crate::config::{ConfigError, CrawlSettings};
use crate::crawl::CrawlContext;
use crate::db::Database;
use crate::download::{ThrottledTransport, TransferError};
use crate::progress::ProgressSink;
use crate::queue::CrawlQueue;
use crate::scheduler::{CrawlScheduler, JoinSummary, SchedulerError};
use crate::session::CrawlSession;
use crate::source::{PostSource, TumblrApiSource};

/// Errors from service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Tracked blogs plus the machinery that crawls them.
#[derive(Debug)]
pub struct CrawlService {
    settings: Arc<CrawlSettings>,
    library: BlogLibrary,
    queue: CrawlQueue,
    scheduler: CrawlScheduler,
}

impl CrawlService {
    /// Opens the service on a database with the blog read API as source.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`] if `settings` are out of range.
    /// - [`TransferError`] if the HTTP client cannot be built.
    /// - [`StoreError`] if stored blogs cannot be loaded.
    pub async fn open(
        db: Database,
        settings: CrawlSettings,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, ServiceError> {
        settings.validate()?;
        let transport = ThrottledTransport::from_settings(&settings)?;
        let source = Arc::new(TumblrApiSource::new(transport.clone()));
        let store = Arc::new(SqliteBlogStore::new(db));
        Self::with_parts(store, source, transport, settings, progress).await
    }

    /// Builds the service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`] if `settings` are out of range.
    /// - [`StoreError`] if stored blogs cannot be loaded.
    pub async fn with_parts(
        store: Arc<dyn BlogStore>,
        source: Arc<dyn PostSource>,
        transport: ThrottledTransport,
        settings: CrawlSettings,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, ServiceError> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let library = BlogLibrary::load(
            Arc::clone(&store),
            Arc::clone(&source),
            Arc::clone(&settings),
        )
        .await?;
        let queue = CrawlQueue::new();
        let ctx = CrawlContext {
            source,
            transport,
            store,
            settings: Arc::clone(&settings),
            progress,
        };
        let scheduler = CrawlScheduler::new(ctx, queue.clone());
        Ok(Self {
            settings,
            library,
            queue,
            scheduler,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    #[must_use]
    pub fn library(&self) -> &BlogLibrary {
        &self.library
    }

    #[must_use]
    pub fn queue(&self) -> &CrawlQueue {
        &self.queue
    }

    /// # Errors
    ///
    /// See [`BlogLibrary::add_blog`].
    pub async fn add_blog(&self, url: &str) -> Result<BlogHandle, ServiceError> {
        Ok(self.library.add_blog(url).await?)
    }

    /// # Errors
    ///
    /// See [`BlogLibrary::remove_blog`].
    pub async fn remove_blog(&self, name: &str, delete_files: bool) -> Result<(), ServiceError> {
        Ok(self.library.remove_blog(name, &self.queue, delete_files).await?)
    }

    /// Queues a tracked blog. Returns false if it was already queued.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBlog`] for an untracked name.
    pub fn enqueue(&self, name: &str) -> Result<bool, ServiceError> {
        let blog = self
            .library
            .get(name)
            .ok_or_else(|| ConfigError::UnknownBlog(name.to_string()))?;
        Ok(self.queue.enqueue(blog))
    }

    /// Queues the blogs selected by `mode`.
    pub fn enqueue_auto(&self, mode: EnqueueMode) -> usize {
        self.library.enqueue_auto(&self.queue, mode)
    }

    /// Starts a session with `parallel_blogs` workers.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if a session is running.
    pub fn start(&self) -> Result<CrawlSession, ServiceError> {
        Ok(self.scheduler.start(self.settings.parallel_blogs)?)
    }

    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub async fn pause(&self) -> Result<(), ServiceError> {
        Ok(self.scheduler.pause().await?)
    }

    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub fn resume(&self) -> Result<(), ServiceError> {
        Ok(self.scheduler.resume()?)
    }

    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub fn stop(&self) -> Result<(), ServiceError> {
        Ok(self.scheduler.stop()?)
    }

    pub async fn join(&self) -> JoinSummary {
        self.scheduler.join().await
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Waits until every queued blog has been crawled.
    pub async fn wait_until_drained(&self) {
        self.queue.drained().await;
    }

    /// Stops and joins a running session, then saves every blog still
    /// flagged dirty.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised while saving.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        if self.scheduler.stop().is_ok() {
            self.scheduler.join().await;
        }
        let saved = self.library.save_dirty().await?;
        info!(saved, "service shut down");
        Ok(())
    }
}
