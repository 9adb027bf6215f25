//! Progress notifications emitted while blogs are crawled.

use tokio::sync::mpsc::UnboundedSender;

/// One progress notification for a blog.
///
/// An update with empty text and label marks the end of a blog's crawl; if
/// it carries an error the crawl ended without its record being saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub blog: String,
    /// "Evaluated N of M posts" while enumerating, "NN%" while downloading.
    pub percentage_text: String,
    /// File name or `Post: <id>` of the last item handled.
    pub last_item_label: String,
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// Progress through the blog's pages.
    #[must_use]
    pub fn evaluated(blog: &str, evaluated: u32, total: u32) -> Self {
        Self {
            blog: blog.to_string(),
            percentage_text: format!("Evaluated {evaluated} of {total} posts"),
            last_item_label: String::new(),
            error: None,
        }
    }

    /// Progress through the blog's items.
    #[must_use]
    pub fn downloading(blog: &str, percent: u8, label: impl Into<String>) -> Self {
        Self {
            blog: blog.to_string(),
            percentage_text: format!("{percent}%"),
            last_item_label: label.into(),
            error: None,
        }
    }

    /// Marks the end of a blog's crawl.
    #[must_use]
    pub fn finished(blog: &str) -> Self {
        Self {
            blog: blog.to_string(),
            percentage_text: String::new(),
            last_item_label: String::new(),
            error: None,
        }
    }

    /// Marks the end of a blog's crawl whose record could not be saved.
    #[must_use]
    pub fn failed(blog: &str, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::finished(blog)
        }
    }

    /// Returns whether this is an end-of-crawl marker, failed or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.percentage_text.is_empty() && self.last_item_label.is_empty()
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Receiver of progress notifications. Must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl ProgressSink for UnboundedSender<ProgressUpdate> {
    fn report(&self, update: ProgressUpdate) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.send(update);
    }
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}
}
