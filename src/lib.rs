//! Blogcrawl Core Library
//!
//! Crawls paginated blog archives and stores their media and text posts on
//! disk. Crawls are resumable and deduplicated per blog, throttled, and can
//! be paused or stopped cooperatively.
//!
//! # Architecture
//!
//! - [`blog`] - Tracked blogs, link ledger, library operations and storage
//! - [`config`] - Crawl settings and their validation
//! - [`crawl`] - Page enumeration, item classification and the per-blog job
//! - [`db`] - Database connection and schema management
//! - [`download`] - Throttled HTTP transport and item transfers
//! - [`progress`] - Progress notifications
//! - [`queue`] - Pending queue and active set
//! - [`scheduler`] - Blog-level worker pool
//! - [`service`] - Everything above wired together for controllers
//! - [`session`] - Pause gate and cancellation shared by a session's workers
//! - [`source`] - Post source contract and the blog read API client

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blog;
pub mod config;
pub mod crawl;
pub mod db;
pub mod download;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use blog::{
    Blog, BlogHandle, BlogLibrary, BlogStore, EnqueueMode, LibraryError, LinkLedger,
    SqliteBlogStore, StoreError, blog_name_from_url, canonical_blog_url,
};
pub use config::{CategoryToggles, ConfigError, CrawlSettings, ImageSize, VideoSize};
pub use crawl::{BlogCrawlJob, BlogCrawlReport, Category, CrawlContext, CrawlError, FetchableItem};
pub use db::{Database, DbError};
pub use download::{BandwidthLimit, DownloadOutcome, ItemDownloader, ThrottledTransport, TransferError};
pub use progress::{NoopProgress, ProgressSink, ProgressUpdate};
pub use queue::{ActiveLease, CrawlQueue, QueueError, QueueItem};
pub use scheduler::{CrawlScheduler, JoinSummary, SchedulerError};
pub use service::{CrawlService, ServiceError};
pub use session::{CrawlSession, PauseToken, StartTicket};
pub use source::{BlogMeta, Post, PostPage, PostSource, PostType, SourceError, TumblrApiSource};
