//! Tracked blogs: persisted record, live handle, ledger and storage.
//!
//! A [`Blog`] is the serializable record. While the process runs each blog
//! lives behind a [`BlogHandle`], which splits the link ledger out of the
//! record so transfers can consult it without locking the whole blog.

mod address;
mod ledger;
pub mod library;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CategoryToggles, CrawlSettings, ImageSize, VideoSize};

pub use address::{blog_name_from_url, canonical_blog_url};
pub use ledger::{Claim, LedgerClaim, LinkLedger};
pub use library::{BlogLibrary, EnqueueMode, LibraryError};
pub use store::{BlogStore, SqliteBlogStore, StoreError};

/// Counters of items fetched so far, per category.
///
/// `total` counts media and text items but not metadata records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadedCounts {
    pub total: u32,
    pub photos: u32,
    pub videos: u32,
    pub audios: u32,
    pub texts: u32,
    pub quotes: u32,
    pub links: u32,
    pub conversations: u32,
    pub photo_meta: u32,
    pub video_meta: u32,
    pub audio_meta: u32,
}

/// Aggregate statistics of a blog as of its last crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogStats {
    /// Posts reported by the API.
    pub posts: u32,
    /// Photo items selected at the configured size.
    pub photos: u32,
    pub videos: u32,
    pub audios: u32,
    pub texts: u32,
    pub quotes: u32,
    pub links: u32,
    pub conversations: u32,
    /// Media and text items discovered by the last enumeration.
    pub total_count: u32,
    pub downloaded: DownloadedCounts,
}

/// Persisted state of one tracked blog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Only posts carrying one of these tags are fetched; empty means all.
    #[serde(default)]
    pub tags: Vec<String>,
    pub toggles: CategoryToggles,
    #[serde(default)]
    pub skip_animated: bool,
    /// Overrides the global image size when set.
    #[serde(default)]
    pub image_size: Option<ImageSize>,
    /// Overrides the global video size when set.
    #[serde(default)]
    pub video_size: Option<VideoSize>,
    #[serde(default)]
    pub stats: BlogStats,
    /// Percentage of discovered items fetched, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub last_complete_crawl: Option<DateTime<Utc>>,
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub online: bool,
    /// Set while a crawl is running; a dirty record is not final.
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub last_downloaded_photo: Option<PathBuf>,
    #[serde(default)]
    pub last_downloaded_video: Option<PathBuf>,
    /// Identifiers already fetched (the persisted link ledger).
    #[serde(default)]
    pub links: Vec<String>,
}

impl Blog {
    /// Creates a blog record with the defaults from `settings`.
    #[must_use]
    pub fn new(name: &str, settings: &CrawlSettings) -> Self {
        Self {
            name: name.to_string(),
            url: canonical_blog_url(name),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            toggles: settings.toggles,
            skip_animated: settings.skip_animated,
            image_size: None,
            video_size: None,
            stats: BlogStats::default(),
            progress: 0,
            last_complete_crawl: None,
            date_added: Utc::now(),
            online: false,
            dirty: false,
            last_downloaded_photo: None,
            last_downloaded_video: None,
            links: Vec::new(),
        }
    }

    /// Directory the blog's files are written to.
    #[must_use]
    pub fn download_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }

    /// Clears the "currently downloading" preview pointers.
    pub fn clear_preview(&mut self) {
        self.last_downloaded_photo = None;
        self.last_downloaded_video = None;
    }

    /// Returns whether a crawl of this blog has ever finished.
    #[must_use]
    pub fn has_completed_crawl(&self) -> bool {
        self.last_complete_crawl.is_some()
    }
}

#[derive(Debug)]
struct BlogEntry {
    name: String,
    ledger: LinkLedger,
    record: Mutex<Blog>,
}

/// Shared live handle to a tracked blog.
///
/// Clones refer to the same blog. The record lock is never held across an
/// await point.
#[derive(Debug, Clone)]
pub struct BlogHandle {
    inner: Arc<BlogEntry>,
}

impl BlogHandle {
    /// Wraps a loaded record, moving its persisted links into a live ledger.
    #[must_use]
    pub fn from_blog(mut blog: Blog) -> Self {
        let ledger = LinkLedger::from_links(std::mem::take(&mut blog.links));
        Self {
            inner: Arc::new(BlogEntry {
                name: blog.name.clone(),
                ledger,
                record: Mutex::new(blog),
            }),
        }
    }

    /// Blog name; immutable for the handle's lifetime.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn ledger(&self) -> &LinkLedger {
        &self.inner.ledger
    }

    fn lock(&self) -> MutexGuard<'_, Blog> {
        self.inner.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with shared access to the record.
    pub fn read<R>(&self, f: impl FnOnce(&Blog) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` with exclusive access to the record.
    pub fn update<R>(&self, f: impl FnOnce(&mut Blog) -> R) -> R {
        f(&mut self.lock())
    }

    /// Full record including the current ledger contents, ready to persist.
    #[must_use]
    pub fn snapshot(&self) -> Blog {
        let mut blog = self.lock().clone();
        blog.links = self.inner.ledger.snapshot();
        blog
    }

    /// Returns true when both handles refer to the same blog.
    #[must_use]
    pub fn same_blog(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
