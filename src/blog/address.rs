//! Blog name extraction and canonical URLs.

use url::Url;

use crate::config::ConfigError;

/// Extracts the blog name from a `http(s)://<name>.<domain>.<tld>/...` URL.
///
/// The name is the first host label; the host must have at least three
/// labels.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBlogUrl`] for anything else.
///
/// # Example
///
/// ```
/// use blogcrawl_core::blog::blog_name_from_url;
///
/// assert_eq!(blog_name_from_url("https://staff.tumblr.com/post/1").unwrap(), "staff");
/// assert!(blog_name_from_url("https://tumblr.com").is_err());
/// ```
pub fn blog_name_from_url(input: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidBlogUrl(input.to_string());

    let parsed = Url::parse(input.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }

    let host = parsed.host_str().ok_or_else(invalid)?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    let name = labels[0];
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid());
    }
    Ok(name.to_ascii_lowercase())
}

/// The URL a blog is crawled from.
#[must_use]
pub fn canonical_blog_url(name: &str) -> String {
    format!("https://{name}.tumblr.com/")
}
