//! Turns pages of posts into fetchable items.
//!
//! Classification is synchronous and pure ([`PostEnumerator::classify`]);
//! [`PostEnumerator::harvest_page`] only adds the fetch in front of it.

use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument};

use super::item::{Category, FetchableItem};
use crate::blog::Blog;
use crate::config::{CategoryToggles, CrawlSettings, ImageSize, VideoSize};
use crate::source::{BlogMeta, PAGE_SIZE, Post, PostSource, PostType, SourceError};

/// Host that serves re-encoded low resolution videos.
const LOW_RES_VIDEO_HOST: &str = "http://vt.tumblr.com/";

#[allow(clippy::expect_used)]
static VIDEO_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<source src="(.*)" type="video/mp4">"#).expect("video regex is valid")
});

#[allow(clippy::expect_used)]
static AUDIO_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="(.*)" height"#).expect("audio regex is valid"));

/// Per-blog choices that drive classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationOptions {
    pub toggles: CategoryToggles,
    pub image_size: ImageSize,
    pub video_size: VideoSize,
    pub skip_animated: bool,
    /// Lowercased required tags; empty accepts every post.
    pub tags: Vec<String>,
}

impl EnumerationOptions {
    /// Resolves the blog's toggles and overrides against the global settings.
    #[must_use]
    pub fn for_blog(blog: &Blog, settings: &CrawlSettings) -> Self {
        Self {
            toggles: blog.toggles,
            image_size: blog.image_size.unwrap_or(settings.image_size),
            video_size: blog.video_size.unwrap_or(settings.video_size),
            skip_animated: blog.skip_animated,
            tags: blog
                .tags
                .iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }
}

/// Statistics contributed by one page.
///
/// Post-type counts include every post on the page. `photos` counts the
/// photo items selected, and `total_downloads` counts emitted media and
/// text items (metadata records excluded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub posts: u32,
    pub photos: u32,
    pub videos: u32,
    pub audios: u32,
    pub texts: u32,
    pub quotes: u32,
    pub links: u32,
    pub conversations: u32,
    pub total_downloads: u32,
}

impl AddAssign for PageStats {
    fn add_assign(&mut self, other: Self) {
        self.posts += other.posts;
        self.photos += other.photos;
        self.videos += other.videos;
        self.audios += other.audios;
        self.texts += other.texts;
        self.quotes += other.quotes;
        self.links += other.links;
        self.conversations += other.conversations;
        self.total_downloads += other.total_downloads;
    }
}

/// Items and statistics of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHarvest {
    pub items: Vec<FetchableItem>,
    pub stats: PageStats,
}

impl PageHarvest {
    fn push(&mut self, item: FetchableItem) {
        if !item.category.is_meta() {
            self.stats.total_downloads += 1;
        }
        if item.category == Category::Photo {
            self.stats.photos += 1;
        }
        self.items.push(item);
    }
}

/// Enumerates one blog's posts page by page.
#[derive(Clone)]
pub struct PostEnumerator {
    source: Arc<dyn PostSource>,
    options: EnumerationOptions,
}

impl std::fmt::Debug for PostEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostEnumerator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PostEnumerator {
    #[must_use]
    pub fn new(source: Arc<dyn PostSource>, options: EnumerationOptions) -> Self {
        Self { source, options }
    }

    /// Number of pages to request for `total_posts` posts.
    #[must_use]
    pub fn page_count(total_posts: u32) -> u32 {
        total_posts / PAGE_SIZE + 1
    }

    /// Fetches blog metadata (title, description, post total).
    ///
    /// # Errors
    ///
    /// Propagates the source's [`SourceError`].
    pub async fn fetch_meta(&self, blog_url: &str) -> Result<BlogMeta, SourceError> {
        self.source.fetch_meta(blog_url).await
    }

    /// Fetches page `page` (offset `page * 50`) and classifies its posts.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`SourceError`].
    #[instrument(skip(self), fields(blog = %blog_url))]
    pub async fn harvest_page(&self, blog_url: &str, page: u32) -> Result<PageHarvest, SourceError> {
        let start = page.saturating_mul(PAGE_SIZE);
        let fetched = self.source.fetch_page(blog_url, PAGE_SIZE, start).await?;
        let harvest = self.classify(&fetched.posts);
        debug!(
            posts = fetched.posts.len(),
            items = harvest.items.len(),
            "classified page"
        );
        Ok(harvest)
    }

    /// Classifies posts into items according to the blog's options.
    #[must_use]
    pub fn classify(&self, posts: &[Post]) -> PageHarvest {
        let mut harvest = PageHarvest::default();
        for post in posts {
            self.classify_post(post, &mut harvest);
        }
        harvest
    }

    fn classify_post(&self, post: &Post, harvest: &mut PageHarvest) {
        let toggles = &self.options.toggles;
        let wanted = self.matches_tags(post);
        harvest.stats.posts += 1;

        match post.post_type {
            PostType::Photo => {
                if !wanted || !(toggles.photos || toggles.photo_meta) {
                    return;
                }
                let urls = self.select_photos(post);
                if toggles.photos {
                    for url in &urls {
                        harvest.push(FetchableItem::media(Category::Photo, &post.id, url));
                    }
                }
                if toggles.photo_meta {
                    harvest.push(FetchableItem::record(
                        Category::PhotoMeta,
                        &post.id,
                        photo_meta_record(post, &urls),
                    ));
                }
            }
            PostType::Video => {
                harvest.stats.videos += 1;
                if !wanted {
                    return;
                }
                if toggles.videos {
                    for url in video_urls(post, self.options.video_size) {
                        harvest.push(FetchableItem::media(Category::Video, &post.id, url));
                    }
                }
                if toggles.video_meta {
                    harvest.push(FetchableItem::record(
                        Category::VideoMeta,
                        &post.id,
                        video_meta_record(post),
                    ));
                }
            }
            PostType::Audio => {
                harvest.stats.audios += 1;
                if !wanted {
                    return;
                }
                if toggles.audio {
                    for url in audio_urls(post) {
                        harvest.push(FetchableItem::media(Category::Audio, &post.id, url));
                    }
                }
                if toggles.audio_meta {
                    harvest.push(FetchableItem::record(
                        Category::AudioMeta,
                        &post.id,
                        audio_meta_record(post),
                    ));
                }
            }
            PostType::Regular => {
                harvest.stats.texts += 1;
                if wanted && toggles.texts {
                    harvest.push(FetchableItem::record(Category::Text, &post.id, text_record(post)));
                }
            }
            PostType::Quote => {
                harvest.stats.quotes += 1;
                if wanted && toggles.quotes {
                    harvest.push(FetchableItem::record(
                        Category::Quote,
                        &post.id,
                        quote_record(post),
                    ));
                }
            }
            PostType::Link => {
                harvest.stats.links += 1;
                if wanted && toggles.links {
                    harvest.push(FetchableItem::record(Category::Link, &post.id, link_record(post)));
                }
            }
            PostType::Conversation => {
                harvest.stats.conversations += 1;
                if wanted && toggles.conversations {
                    harvest.push(FetchableItem::record(
                        Category::Conversation,
                        &post.id,
                        conversation_record(post),
                    ));
                }
            }
            PostType::Answer | PostType::Other(_) => {}
        }
    }

    fn matches_tags(&self, post: &Post) -> bool {
        self.options.tags.is_empty()
            || post
                .tags
                .iter()
                .any(|tag| self.options.tags.contains(&tag.trim().to_lowercase()))
    }

    /// Picks the rendition whose `max-width` equals the configured size.
    /// Photos without that exact rendition are skipped, as are animated
    /// ones when the blog skips them.
    fn select_photos(&self, post: &Post) -> Vec<String> {
        let width = self.options.image_size.width();
        let renditions: Vec<&[crate::source::PhotoUrl]> = if post.is_photoset() {
            post.photoset.iter().map(Vec::as_slice).collect()
        } else {
            vec![post.photo_urls.as_slice()]
        };

        renditions
            .into_iter()
            .filter_map(|photo| photo.iter().find(|r| r.max_width == width))
            .map(|rendition| rendition.url.clone())
            .filter(|url| !(self.options.skip_animated && is_animated(url)))
            .collect()
    }
}

fn is_animated(url: &str) -> bool {
    url.to_ascii_lowercase().ends_with(".gif")
}

fn video_urls(post: &Post, size: VideoSize) -> Vec<String> {
    let sources = captured(&post.video_players, "<source src=", &VIDEO_SOURCE);
    sources
        .into_iter()
        .map(|source| {
            let full = source.replace("/480", "");
            match size {
                VideoSize::Hd1080 => format!("{full}.mp4"),
                VideoSize::Sd480 => {
                    let file = full.rsplit('/').next().unwrap_or(&full);
                    format!("{LOW_RES_VIDEO_HOST}{file}_480.mp4")
                }
            }
        })
        .collect()
}

fn audio_urls(post: &Post) -> Vec<String> {
    captured(&post.audio_players, "src=", &AUDIO_SOURCE)
}

/// First capture group of `pattern` in each player containing `marker`,
/// deduplicated in order.
fn captured(players: &[String], marker: &str, pattern: &Regex) -> Vec<String> {
    let mut seen = HashSet::new();
    players
        .iter()
        .filter(|player| player.contains(marker))
        .filter_map(|player| pattern.captures(player))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect()
}

fn tags_line(post: &Post) -> String {
    format!("Tags: {}\n", post.tags.join(", "))
}

fn record_head(post: &Post) -> String {
    format!(
        "Post ID: {}, Date: {}\nUrl with slug: {}\n",
        post.id, post.date_gmt, post.url_with_slug
    )
}

fn text_record(post: &Post) -> String {
    format!(
        "{}Reblog key: {}\nTitle: {}\nBody: {}\n{}",
        record_head(post),
        post.reblog_key,
        post.regular_title,
        post.regular_body,
        tags_line(post)
    )
}

fn quote_record(post: &Post) -> String {
    format!(
        "{}Reblog key: {}\nQuote: {}\n{}\n{}",
        record_head(post),
        post.reblog_key,
        post.quote_text,
        post.quote_source,
        tags_line(post)
    )
}

fn link_record(post: &Post) -> String {
    format!(
        "{}Reblog key: {}\nLink: {}\n{}\n{}\n{}",
        record_head(post),
        post.reblog_key,
        post.link_text,
        post.link_url,
        post.link_description,
        tags_line(post)
    )
}

fn conversation_record(post: &Post) -> String {
    format!(
        "{}Reblog key: {}\nConversation: {}\n{}",
        record_head(post),
        post.reblog_key,
        post.conversation_text,
        tags_line(post)
    )
}

fn photo_meta_record(post: &Post, urls: &[String]) -> String {
    format!(
        "{}Photourl: {}\nReblog key: {}\nPhoto Caption: {}\n{}",
        record_head(post),
        urls.join(", "),
        post.reblog_key,
        post.photo_caption,
        tags_line(post)
    )
}

fn video_meta_record(post: &Post) -> String {
    format!(
        "{}Reblog key: {}\nVideo Player: {}\n{}",
        record_head(post),
        post.reblog_key,
        post.video_players.first().map_or("", String::as_str),
        tags_line(post)
    )
}

fn audio_meta_record(post: &Post) -> String {
    let id3 = &post.id3;
    format!(
        "{}Reblog key: {}\nAudio caption: {}\nId3: artist: {}\nId3: title: {}\nId3: track: {}\nId3: album: {}\nId3: year: {}\n{}",
        record_head(post),
        post.reblog_key,
        post.audio_caption,
        id3.artist,
        id3.title,
        id3.track,
        id3.album,
        id3.year,
        tags_line(post)
    )
}
