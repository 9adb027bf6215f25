//! Units of work discovered by enumeration.

use std::fmt;

/// Category of a fetchable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Photo,
    Video,
    Audio,
    Text,
    Quote,
    Link,
    Conversation,
    PhotoMeta,
    VideoMeta,
    AudioMeta,
}

impl Category {
    /// Every category, in counter order.
    pub const ALL: [Self; 10] = [
        Self::Photo,
        Self::Video,
        Self::Audio,
        Self::Text,
        Self::Quote,
        Self::Link,
        Self::Conversation,
        Self::PhotoMeta,
        Self::VideoMeta,
        Self::AudioMeta,
    ];

    /// Stable index into per-category arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Photo => 0,
            Self::Video => 1,
            Self::Audio => 2,
            Self::Text => 3,
            Self::Quote => 4,
            Self::Link => 5,
            Self::Conversation => 6,
            Self::PhotoMeta => 7,
            Self::VideoMeta => 8,
            Self::AudioMeta => 9,
        }
    }

    /// Metadata records describe a post but are not counted as downloads.
    #[must_use]
    pub fn is_meta(self) -> bool {
        matches!(self, Self::PhotoMeta | Self::VideoMeta | Self::AudioMeta)
    }

    /// File that text-shaped items of this category are appended to.
    #[must_use]
    pub fn text_file_name(self) -> Option<&'static str> {
        match self {
            Self::Text => Some("texts.txt"),
            Self::Quote => Some("quotes.txt"),
            Self::Link => Some("links.txt"),
            Self::Conversation => Some("conversations.txt"),
            Self::PhotoMeta => Some("photos_meta.txt"),
            Self::VideoMeta => Some("videos_meta.txt"),
            Self::AudioMeta => Some("audios_meta.txt"),
            Self::Photo | Self::Video | Self::Audio => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Quote => "quote",
            Self::Link => "link",
            Self::Conversation => "conversation",
            Self::PhotoMeta => "photo-meta",
            Self::VideoMeta => "video-meta",
            Self::AudioMeta => "audio-meta",
        };
        f.write_str(name)
    }
}

/// What an item transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPayload {
    /// Remote resource streamed to a file.
    Url(String),
    /// Synthesized record appended to the category file.
    Record(String),
}

/// One discovered unit of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchableItem {
    pub category: Category,
    pub post_id: String,
    pub payload: ItemPayload,
}

impl FetchableItem {
    /// A binary item keyed by its URL.
    #[must_use]
    pub fn media(category: Category, post_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            category,
            post_id: post_id.into(),
            payload: ItemPayload::Url(url.into()),
        }
    }

    /// A text item keyed by its post id.
    #[must_use]
    pub fn record(
        category: Category,
        post_id: impl Into<String>,
        record: impl Into<String>,
    ) -> Self {
        Self {
            category,
            post_id: post_id.into(),
            payload: ItemPayload::Record(record.into()),
        }
    }

    /// Ledger key: the resource URL for binary items, the post id otherwise.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match &self.payload {
            ItemPayload::Url(url) => url,
            ItemPayload::Record(_) => &self.post_id,
        }
    }
}
