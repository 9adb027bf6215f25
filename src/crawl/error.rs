//! Error types for a single blog crawl.

use thiserror::Error;

use crate::blog::StoreError;
use crate::source::SourceError;

/// Reasons a [`BlogCrawlJob`](super::BlogCrawlJob) did not complete.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The session was stopped. Expected during shutdown, not a fault.
    #[error("crawl cancelled")]
    Cancelled,

    /// The blog's metadata could not be fetched.
    #[error("failed to read blog {blog}: {source}")]
    Source {
        blog: String,
        #[source]
        source: SourceError,
    },

    /// The blog record could not be saved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CrawlError {
    pub fn source_failed(blog: impl Into<String>, source: SourceError) -> Self {
        Self::Source {
            blog: blog.into(),
            source,
        }
    }

    /// Returns true for the expected end-of-session signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
