//! Failures of a single HTTP fetch or item transfer.
//!
//! A transfer error never aborts a crawl: the job counts the item as failed,
//! logs it and moves on. Each variant names the URL or file involved.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Connection, DNS or TLS failure, or a body cut off mid-stream.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The read or connect timeout elapsed.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Writing the item (or its directory) to disk failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl TransferError {
    /// Wraps a reqwest failure; timeouts get their own variant.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// True when the local disk failed, not the remote side.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

// No blanket `From` impls: the source errors carry neither url nor path.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_names_code_and_url() {
        let error = TransferError::http_status("https://media.example/a.jpg", 404);
        let msg = error.to_string();
        assert_eq!(msg, "HTTP 404 fetching https://media.example/a.jpg");
        assert!(!error.is_local());
    }

    #[test]
    fn test_io_error_is_local_and_names_path() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = TransferError::io(PathBuf::from("/blogs/staff/a.jpg"), source);
        assert!(error.is_local());
        assert!(error.to_string().starts_with("cannot write /blogs/staff/a.jpg"));
    }

    #[test]
    fn test_invalid_url_display() {
        let error = TransferError::invalid_url("not-a-url");
        assert_eq!(error.to_string(), "invalid URL: not-a-url");
    }

    #[test]
    fn test_timeout_display() {
        let error = TransferError::Timeout {
            url: "https://staff.tumblr.com/api/read".into(),
        };
        assert_eq!(
            error.to_string(),
            "timeout fetching https://staff.tumblr.com/api/read"
        );
    }
}
