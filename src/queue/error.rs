//! Error types for queue mutations.

use thiserror::Error;

/// Errors from queue mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// A running crawl owns the blog; it leaves the queue when the crawl ends.
    #[error("blog {0} is being crawled")]
    Active(String),
}
