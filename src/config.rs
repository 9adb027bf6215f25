//! Crawl settings consumed by the engine.
//!
//! [`CrawlSettings`] is plain data: the binary fills it from a TOML file and
//! CLI flags, the library only reads it. [`CrawlSettings::validate`] must be
//! called before a session is started.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::constants::DEFAULT_TIMEOUT_SECS;

/// Default number of blogs crawled at once.
pub const DEFAULT_PARALLEL_BLOGS: usize = 2;
/// Upper bound for `parallel_blogs`.
pub const MAX_PARALLEL_BLOGS: usize = 32;
/// Default number of item transfers shared by all active blogs.
pub const DEFAULT_PARALLEL_IMAGES: usize = 25;
/// Upper bound for `parallel_images`.
pub const MAX_PARALLEL_IMAGES: usize = 100;
/// Upper bound for `timeout_secs`.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors raised while validating settings or blog input.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
        /// Rejected value.
        value: u64,
    },

    /// Image width not offered by the post API.
    #[error("unsupported image size {0} (expected 1280, 500, 400, 250, 100 or 75)")]
    InvalidImageSize(u32),

    /// Video height not offered by the post API.
    #[error("unsupported video size {0} (expected 480 or 1080)")]
    InvalidVideoSize(u32),

    /// The URL does not name a blog.
    #[error("invalid blog URL: {0}")]
    InvalidBlogUrl(String),

    /// A blog with the same name is already tracked.
    #[error("blog already exists: {0}")]
    BlogAlreadyExists(String),

    /// No blog with this name is tracked.
    #[error("unknown blog: {0}")]
    UnknownBlog(String),
}

/// Photo width requested from the post API (`max-width` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ImageSize {
    /// 1280 px
    #[default]
    W1280,
    /// 500 px
    W500,
    /// 400 px
    W400,
    /// 250 px
    W250,
    /// 100 px
    W100,
    /// 75 px
    W75,
}

impl ImageSize {
    /// Width in pixels.
    #[must_use]
    pub fn width(self) -> u32 {
        match self {
            Self::W1280 => 1280,
            Self::W500 => 500,
            Self::W400 => 400,
            Self::W250 => 250,
            Self::W100 => 100,
            Self::W75 => 75,
        }
    }
}

impl TryFrom<u32> for ImageSize {
    type Error = ConfigError;

    fn try_from(width: u32) -> Result<Self, Self::Error> {
        match width {
            1280 => Ok(Self::W1280),
            500 => Ok(Self::W500),
            400 => Ok(Self::W400),
            250 => Ok(Self::W250),
            100 => Ok(Self::W100),
            75 => Ok(Self::W75),
            other => Err(ConfigError::InvalidImageSize(other)),
        }
    }
}

impl From<ImageSize> for u32 {
    fn from(size: ImageSize) -> Self {
        size.width()
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.width())
    }
}

/// Video quality to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum VideoSize {
    /// 480p, rebuilt on the video CDN host.
    Sd480,
    /// Full resolution.
    #[default]
    Hd1080,
}

impl VideoSize {
    /// Vertical resolution.
    #[must_use]
    pub fn height(self) -> u32 {
        match self {
            Self::Sd480 => 480,
            Self::Hd1080 => 1080,
        }
    }
}

impl TryFrom<u32> for VideoSize {
    type Error = ConfigError;

    fn try_from(height: u32) -> Result<Self, Self::Error> {
        match height {
            480 => Ok(Self::Sd480),
            1080 => Ok(Self::Hd1080),
            other => Err(ConfigError::InvalidVideoSize(other)),
        }
    }
}

impl From<VideoSize> for u32 {
    fn from(size: VideoSize) -> Self {
        size.height()
    }
}

/// Which categories a blog downloads. Settings carry the defaults given to
/// newly added blogs; each blog then keeps its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CategoryToggles {
    pub photos: bool,
    pub videos: bool,
    pub audio: bool,
    pub texts: bool,
    pub quotes: bool,
    pub links: bool,
    pub conversations: bool,
    /// Write a metadata record per photo post.
    pub photo_meta: bool,
    /// Write a metadata record per video post.
    pub video_meta: bool,
    /// Write a metadata record per audio post.
    pub audio_meta: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            photos: true,
            videos: true,
            audio: true,
            texts: false,
            quotes: false,
            links: false,
            conversations: false,
            photo_meta: false,
            video_meta: false,
            audio_meta: false,
        }
    }
}

/// Options recognized by the crawl engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Number of blog-level workers.
    pub parallel_blogs: usize,
    /// Item transfers shared across all active blogs.
    pub parallel_images: usize,
    /// Global bandwidth cap in KiB/s; 0 disables throttling.
    pub bandwidth_kbps: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub image_size: ImageSize,
    pub video_size: VideoSize,
    /// Default "skip animated" flag for new blogs.
    pub skip_animated: bool,
    /// Default toggles for new blogs.
    pub toggles: CategoryToggles,
    /// Root directory; each blog downloads into `<root>/<name>`.
    pub download_root: PathBuf,
    /// Track the most recent photo/video of each blog for previews.
    pub enable_preview: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            parallel_blogs: DEFAULT_PARALLEL_BLOGS,
            parallel_images: DEFAULT_PARALLEL_IMAGES,
            bandwidth_kbps: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            image_size: ImageSize::default(),
            video_size: VideoSize::default(),
            skip_animated: false,
            toggles: CategoryToggles::default(),
            download_root: PathBuf::from("Blogs"),
            enable_preview: true,
        }
    }
}

impl CrawlSettings {
    /// Checks every bounded setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first setting outside its
    /// range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("parallel_blogs", self.parallel_blogs as u64, 1, MAX_PARALLEL_BLOGS as u64)?;
        check_range(
            "parallel_images",
            self.parallel_images as u64,
            1,
            MAX_PARALLEL_IMAGES as u64,
        )?;
        check_range("timeout_secs", self.timeout_secs, 1, MAX_TIMEOUT_SECS)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = CrawlSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.parallel_blogs, 2);
        assert_eq!(settings.parallel_images, 25);
        assert_eq!(settings.image_size.width(), 1280);
        assert_eq!(settings.video_size.height(), 1080);
    }

    #[test]
    fn test_validate_rejects_zero_parallel_blogs() {
        let settings = CrawlSettings {
            parallel_blogs: 0,
            ..CrawlSettings::default()
        };
        match settings.validate() {
            Err(ConfigError::OutOfRange { field, value, .. }) => {
                assert_eq!(field, "parallel_blogs");
                assert_eq!(value, 0);
            }
            other => panic!("Expected OutOfRange, got: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_excessive_timeout() {
        let settings = CrawlSettings {
            timeout_secs: 7200,
            ..CrawlSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_image_size_round_trips_through_u32() {
        assert_eq!(ImageSize::try_from(500).unwrap(), ImageSize::W500);
        assert_eq!(u32::from(ImageSize::W75), 75);
        assert!(matches!(
            ImageSize::try_from(640),
            Err(ConfigError::InvalidImageSize(640))
        ));
    }

    #[test]
    fn test_video_size_rejects_unknown_height() {
        assert_eq!(VideoSize::try_from(480).unwrap(), VideoSize::Sd480);
        assert!(VideoSize::try_from(720).is_err());
    }

    #[test]
    fn test_settings_deserialize_from_partial_json() {
        let settings: CrawlSettings =
            serde_json::from_str(r#"{"parallel_blogs": 4, "image_size": 500, "video_size": 480}"#)
                .unwrap();
        assert_eq!(settings.parallel_blogs, 4);
        assert_eq!(settings.image_size, ImageSize::W500);
        assert_eq!(settings.video_size, VideoSize::Sd480);
        assert_eq!(settings.parallel_images, DEFAULT_PARALLEL_IMAGES);
    }

    #[test]
    fn test_invalid_image_size_fails_deserialize() {
        let result: Result<CrawlSettings, _> = serde_json::from_str(r#"{"image_size": 640}"#);
        assert!(result.is_err());
    }
}
