//! Queue entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::blog::BlogHandle;

/// A blog waiting for or undergoing a crawl, with its live progress.
///
/// The entry refers to the blog; it never owns it.
#[derive(Debug, Clone)]
pub struct QueueItem {
    blog: BlogHandle,
    progress: Arc<AtomicU8>,
}

impl QueueItem {
    #[must_use]
    pub fn new(blog: BlogHandle) -> Self {
        let progress = blog.read(|b| b.progress);
        Self {
            blog,
            progress: Arc::new(AtomicU8::new(progress)),
        }
    }

    #[must_use]
    pub fn blog(&self) -> &BlogHandle {
        &self.blog
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.blog.name()
    }

    /// Last reported percentage.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub(crate) fn set_progress(&self, percent: u8) {
        self.progress.store(percent, Ordering::SeqCst);
    }

    /// Returns true when both entries refer to the same blog.
    #[must_use]
    pub fn is_for(&self, blog: &BlogHandle) -> bool {
        self.blog.same_blog(blog)
    }
}
