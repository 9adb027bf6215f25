//! Post enumeration seam.
//!
//! The crawl engine asks a [`PostSource`] for blog metadata and for pages of
//! posts; it never sees the wire format. [`TumblrApiSource`] implements the
//! seam against the XML read API.

mod tumblr;

use async_trait::async_trait;
use thiserror::Error;

use crate::download::TransferError;

pub use tumblr::{ApiDocument, TumblrApiSource, api_url, parse_document};

/// Posts per API page.
pub const PAGE_SIZE: u32 = 50;

/// Failure to fetch or understand a page.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request itself failed.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: TransferError,
    },

    /// The response was not a well-formed post document.
    #[error("malformed response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl SourceError {
    /// Creates a fetch error.
    pub fn fetch(url: impl Into<String>, source: TransferError) -> Self {
        Self::Fetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Blog-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlogMeta {
    pub title: String,
    pub description: String,
    pub total_posts: u32,
}

/// Post kinds known to the read API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostType {
    Regular,
    Photo,
    Quote,
    Link,
    Conversation,
    Video,
    Audio,
    Answer,
    Other(String),
}

impl PostType {
    /// Maps the API's `type` attribute.
    #[must_use]
    pub fn from_api(value: &str) -> Self {
        match value {
            "regular" | "text" => Self::Regular,
            "photo" => Self::Photo,
            "quote" => Self::Quote,
            "link" => Self::Link,
            "conversation" | "chat" => Self::Conversation,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "answer" => Self::Answer,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One rendition of a photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUrl {
    /// The `max-width` the rendition was scaled to.
    pub max_width: u32,
    pub url: String,
}

/// ID3 fields of an audio post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3Tags {
    pub artist: String,
    pub title: String,
    pub track: String,
    pub album: String,
    pub year: String,
}

/// A post as returned by the API. Fields not used by a post's type stay
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub post_type: PostType,
    pub date_gmt: String,
    pub url_with_slug: String,
    pub reblog_key: String,
    pub tags: Vec<String>,
    /// Renditions of a single-photo post.
    pub photo_urls: Vec<PhotoUrl>,
    /// Renditions of each photo of a photoset, in order.
    pub photoset: Vec<Vec<PhotoUrl>>,
    pub photo_caption: String,
    /// Embedded player markup, one entry per offered width.
    pub video_players: Vec<String>,
    pub audio_players: Vec<String>,
    pub audio_caption: String,
    pub id3: Id3Tags,
    pub regular_title: String,
    pub regular_body: String,
    pub quote_text: String,
    pub quote_source: String,
    pub link_text: String,
    pub link_url: String,
    pub link_description: String,
    pub conversation_text: String,
}

impl Post {
    /// Creates an empty post of the given type.
    #[must_use]
    pub fn new(id: impl Into<String>, post_type: PostType) -> Self {
        Self {
            id: id.into(),
            post_type,
            date_gmt: String::new(),
            url_with_slug: String::new(),
            reblog_key: String::new(),
            tags: Vec::new(),
            photo_urls: Vec::new(),
            photoset: Vec::new(),
            photo_caption: String::new(),
            video_players: Vec::new(),
            audio_players: Vec::new(),
            audio_caption: String::new(),
            id3: Id3Tags::default(),
            regular_title: String::new(),
            regular_body: String::new(),
            quote_text: String::new(),
            quote_source: String::new(),
            link_text: String::new(),
            link_url: String::new(),
            link_description: String::new(),
            conversation_text: String::new(),
        }
    }

    /// Returns whether the post is a photoset.
    #[must_use]
    pub fn is_photoset(&self) -> bool {
        !self.photoset.is_empty()
    }
}

/// One page of posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    /// Total posts of the blog as reported with this page.
    pub total_posts: u32,
    pub posts: Vec<Post>,
}

/// Capability to enumerate a blog's posts.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetches up to `page_size` posts starting at offset `start`.
    async fn fetch_page(
        &self,
        blog_url: &str,
        page_size: u32,
        start: u32,
    ) -> Result<PostPage, SourceError>;

    /// Fetches title, description and post total.
    async fn fetch_meta(&self, blog_url: &str) -> Result<BlogMeta, SourceError>;
}
