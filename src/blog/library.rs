//! The set of tracked blogs and the controller-facing operations on it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::store::{BlogStore, StoreError};
use super::{Blog, BlogHandle, blog_name_from_url};
use crate::config::{ConfigError, CrawlSettings};
use crate::queue::{CrawlQueue, QueueError};
use crate::source::PostSource;

/// Errors from library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Which blogs [`BlogLibrary::enqueue_auto`] queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnqueueMode {
    #[default]
    None,
    All,
    /// Blogs whose last crawl ran to completion.
    CompletedOnly,
    /// Blogs that were never crawled to completion.
    NeverCompleted,
}

/// Tracked blogs, one live handle per name.
pub struct BlogLibrary {
    store: Arc<dyn BlogStore>,
    source: Arc<dyn PostSource>,
    settings: Arc<CrawlSettings>,
    blogs: Mutex<BTreeMap<String, BlogHandle>>,
}

impl std::fmt::Debug for BlogLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlogLibrary")
            .field("blogs", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl BlogLibrary {
    /// Loads every stored blog.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    #[instrument(skip_all)]
    pub async fn load(
        store: Arc<dyn BlogStore>,
        source: Arc<dyn PostSource>,
        settings: Arc<CrawlSettings>,
    ) -> Result<Self, StoreError> {
        let blogs = store
            .list_all()
            .await?
            .into_iter()
            .map(|blog| (blog.name.clone(), BlogHandle::from_blog(blog)))
            .collect::<BTreeMap<_, _>>();
        info!(count = blogs.len(), "loaded blogs");
        Ok(Self {
            store,
            source,
            settings,
            blogs: Mutex::new(blogs),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BlogHandle>> {
        self.blogs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<BlogHandle> {
        self.lock().get(name).cloned()
    }

    /// Every tracked blog, ordered by name.
    #[must_use]
    pub fn blogs(&self) -> Vec<BlogHandle> {
        self.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts tracking the blog at `url` with the default toggles.
    ///
    /// Title, description and post total are fetched right away; if that
    /// fails the blog is still added, flagged offline.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidBlogUrl`] if `url` does not name a blog.
    /// - [`ConfigError::BlogAlreadyExists`] if it is already tracked.
    /// - [`StoreError`] if the new record cannot be saved.
    #[instrument(skip(self))]
    pub async fn add_blog(&self, url: &str) -> Result<BlogHandle, LibraryError> {
        let name = blog_name_from_url(url)?;
        if self.lock().contains_key(&name) {
            return Err(ConfigError::BlogAlreadyExists(name).into());
        }

        let mut blog = Blog::new(&name, &self.settings);
        match self.source.fetch_meta(&blog.url).await {
            Ok(meta) => {
                blog.title = meta.title;
                blog.description = meta.description;
                blog.stats.posts = meta.total_posts;
                blog.online = true;
            }
            Err(e) => warn!(error = %e, "blog metadata unavailable, adding offline"),
        }
        self.store.save(&blog).await?;

        let handle = BlogHandle::from_blog(blog);
        let mut blogs = self.lock();
        if blogs.contains_key(&name) {
            return Err(ConfigError::BlogAlreadyExists(name).into());
        }
        blogs.insert(name, handle.clone());
        info!("blog added");
        Ok(handle)
    }

    /// Stops tracking a blog, optionally deleting its downloaded files.
    ///
    /// A waiting blog is taken off the queue first.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownBlog`] if no such blog is tracked.
    /// - [`QueueError::Active`] while the blog is being crawled.
    /// - [`StoreError`] if its files or record cannot be deleted.
    #[instrument(skip(self, queue))]
    pub async fn remove_blog(
        &self,
        name: &str,
        queue: &CrawlQueue,
        delete_files: bool,
    ) -> Result<(), LibraryError> {
        let handle = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownBlog(name.to_string()))?;
        queue.dequeue(name)?;

        if delete_files {
            let dir = handle.read(|b| b.download_dir(&self.settings.download_root));
            remove_dir(name, dir).await?;
        }
        self.store.delete(name).await?;
        self.lock().remove(name);
        info!("blog removed");
        Ok(())
    }

    /// Refreshes a blog's online flag from a metadata fetch.
    pub async fn check_online(&self, blog: &BlogHandle) -> bool {
        let url = blog.read(|b| b.url.clone());
        let online = self.source.fetch_meta(&url).await.is_ok();
        blog.update(|b| b.online = online);
        debug!(blog = %blog.name(), online, "checked blog");
        online
    }

    /// Refreshes the online flag of every blog.
    pub async fn check_all_online(&self) -> usize {
        let mut online = 0;
        for blog in self.blogs() {
            if self.check_online(&blog).await {
                online += 1;
            }
        }
        online
    }

    /// Queues the blogs selected by `mode`, returning how many were added.
    pub fn enqueue_auto(&self, queue: &CrawlQueue, mode: EnqueueMode) -> usize {
        let selected = self.blogs().into_iter().filter(|blog| match mode {
            EnqueueMode::None => false,
            EnqueueMode::All => true,
            EnqueueMode::CompletedOnly => blog.read(Blog::has_completed_crawl),
            EnqueueMode::NeverCompleted => !blog.read(Blog::has_completed_crawl),
        });
        let added = queue.enqueue_all(selected);
        debug!(?mode, added, "auto-enqueued blogs");
        added
    }

    /// Saves every blog still flagged dirty, clearing the flag first.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`]; remaining blogs are still attempted.
    pub async fn save_dirty(&self) -> Result<usize, StoreError> {
        let mut saved = 0;
        let mut first_error = None;
        for blog in self.blogs() {
            let was_dirty = blog.update(|b| std::mem::replace(&mut b.dirty, false));
            if !was_dirty {
                continue;
            }
            match self.store.save(&blog.snapshot()).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(blog = %blog.name(), error = %e, "failed to save dirty blog");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }
}

async fn remove_dir(name: &str, dir: PathBuf) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Files {
            blog: name.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::blog::SqliteBlogStore;
    use crate::db::Database;
    use crate::source::{BlogMeta, PostPage, SourceError};

    struct MetaOnly {
        online: bool,
    }

    #[async_trait]
    impl PostSource for MetaOnly {
        async fn fetch_page(
            &self,
            blog_url: &str,
            _page_size: u32,
            _start: u32,
        ) -> Result<PostPage, SourceError> {
            Err(SourceError::parse(blog_url, "no pages"))
        }

        async fn fetch_meta(&self, blog_url: &str) -> Result<BlogMeta, SourceError> {
            if !self.online {
                return Err(SourceError::parse(blog_url, "offline"));
            }
            Ok(BlogMeta {
                title: "Staff".into(),
                description: "news".into(),
                total_posts: 321,
            })
        }
    }

    async fn library(dir: &TempDir, online: bool) -> (BlogLibrary, Arc<SqliteBlogStore>) {
        let store = Arc::new(SqliteBlogStore::new(Database::new_in_memory().await.unwrap()));
        let settings = CrawlSettings {
            download_root: dir.path().to_path_buf(),
            ..CrawlSettings::default()
        };
        let library = BlogLibrary::load(
            store.clone(),
            Arc::new(MetaOnly { online }),
            Arc::new(settings),
        )
        .await
        .unwrap();
        (library, store)
    }

    #[tokio::test]
    async fn test_add_blog_fetches_meta_and_persists() {
        let dir = TempDir::new().unwrap();
        let (library, store) = library(&dir, true).await;

        let handle = library.add_blog("https://staff.tumblr.com/").await.unwrap();

        assert_eq!(handle.name(), "staff");
        let saved = store.load("staff").await.unwrap();
        assert_eq!(saved.title, "Staff");
        assert_eq!(saved.stats.posts, 321);
        assert!(saved.online);
    }

    #[tokio::test]
    async fn test_add_blog_offline_still_adds() {
        let dir = TempDir::new().unwrap();
        let (library, _store) = library(&dir, false).await;
        let handle = library.add_blog("http://quiet.tumblr.com").await.unwrap();
        assert!(!handle.read(|b| b.online));
        assert_eq!(library.len(), 1);
    }

    #[tokio::test]
    async fn test_add_blog_rejects_duplicates_and_bad_urls() {
        let dir = TempDir::new().unwrap();
        let (library, _store) = library(&dir, true).await;
        library.add_blog("https://staff.tumblr.com/").await.unwrap();

        assert!(matches!(
            library.add_blog("https://Staff.tumblr.com/").await,
            Err(LibraryError::Config(ConfigError::BlogAlreadyExists(name))) if name == "staff"
        ));
        assert!(matches!(
            library.add_blog("ftp://staff.tumblr.com/").await,
            Err(LibraryError::Config(ConfigError::InvalidBlogUrl(_)))
        ));
    }

    #[tokio::test]
    async fn test_remove_blog_deletes_record_and_files() {
        let dir = TempDir::new().unwrap();
        let (library, store) = library(&dir, true).await;
        let queue = CrawlQueue::new();
        let handle = library.add_blog("https://staff.tumblr.com/").await.unwrap();
        let blog_dir = dir.path().join("staff");
        std::fs::create_dir_all(&blog_dir).unwrap();
        std::fs::write(blog_dir.join("texts.txt"), "x").unwrap();
        queue.enqueue(handle);

        library.remove_blog("staff", &queue, true).await.unwrap();

        assert!(!blog_dir.exists());
        assert!(!queue.contains("staff"));
        assert!(library.get("staff").is_none());
        assert!(matches!(store.load("staff").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_active_blog_is_refused() {
        let dir = TempDir::new().unwrap();
        let (library, _store) = library(&dir, true).await;
        let queue = CrawlQueue::new();
        queue.enqueue(library.add_blog("https://staff.tumblr.com/").await.unwrap());
        let _lease = queue.claim_next().unwrap();

        assert!(matches!(
            library.remove_blog("staff", &queue, false).await,
            Err(LibraryError::Queue(QueueError::Active(_)))
        ));
        assert!(library.get("staff").is_some());
    }

    #[tokio::test]
    async fn test_enqueue_auto_modes() {
        let dir = TempDir::new().unwrap();
        let (library, _store) = library(&dir, true).await;
        let done = library.add_blog("https://done.tumblr.com/").await.unwrap();
        library.add_blog("https://fresh.tumblr.com/").await.unwrap();
        done.update(|b| b.last_complete_crawl = Some(chrono::Utc::now()));

        let queue = CrawlQueue::new();
        assert_eq!(library.enqueue_auto(&queue, EnqueueMode::None), 0);
        assert_eq!(library.enqueue_auto(&queue, EnqueueMode::CompletedOnly), 1);
        assert_eq!(queue.snapshot().0, vec!["done"]);
        assert_eq!(library.enqueue_auto(&queue, EnqueueMode::NeverCompleted), 1);
        assert_eq!(library.enqueue_auto(&queue, EnqueueMode::All), 0);
    }

    #[tokio::test]
    async fn test_save_dirty_clears_flag() {
        let dir = TempDir::new().unwrap();
        let (library, store) = library(&dir, true).await;
        let handle = library.add_blog("https://staff.tumblr.com/").await.unwrap();
        handle.update(|b| {
            b.dirty = true;
            b.progress = 42;
        });

        assert_eq!(library.save_dirty().await.unwrap(), 1);
        let saved = store.load("staff").await.unwrap();
        assert!(!saved.dirty);
        assert_eq!(saved.progress, 42);
        assert_eq!(library.save_dirty().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_online() {
        let dir = TempDir::new().unwrap();
        let (library, _store) = library(&dir, false).await;
        let handle = library.add_blog("https://staff.tumblr.com/").await.unwrap();
        assert!(!library.check_online(&handle).await);
        assert_eq!(library.check_all_online().await, 0);
    }
}
