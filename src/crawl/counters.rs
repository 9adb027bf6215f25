//! Lock-free per-category counters for one blog crawl.

use std::sync::atomic::{AtomicU32, Ordering};

use super::item::Category;
use crate::blog::DownloadedCounts;

/// Running "have" counters, seeded from the blog's persisted counts.
///
/// Media and text items also bump the overall total; metadata records only
/// bump their own category.
#[derive(Debug, Default)]
pub struct CrawlCounters {
    per_category: [AtomicU32; Category::ALL.len()],
    total: AtomicU32,
}

impl CrawlCounters {
    /// Starts from previously persisted counts.
    #[must_use]
    pub fn seeded(counts: &DownloadedCounts) -> Self {
        let counters = Self::default();
        counters.total.store(counts.total, Ordering::SeqCst);
        for category in Category::ALL {
            counters.per_category[category.index()]
                .store(persisted(counts, category), Ordering::SeqCst);
        }
        counters
    }

    /// Counts one item as present, returning the new overall total.
    pub fn record(&self, category: Category) -> u32 {
        self.per_category[category.index()].fetch_add(1, Ordering::SeqCst);
        if category.is_meta() {
            self.total()
        } else {
            self.total.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    /// Count for one category.
    #[must_use]
    pub fn get(&self, category: Category) -> u32 {
        self.per_category[category.index()].load(Ordering::SeqCst)
    }

    /// Media and text items counted so far.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    /// Current values in persisted form.
    #[must_use]
    pub fn snapshot(&self) -> DownloadedCounts {
        DownloadedCounts {
            total: self.total(),
            photos: self.get(Category::Photo),
            videos: self.get(Category::Video),
            audios: self.get(Category::Audio),
            texts: self.get(Category::Text),
            quotes: self.get(Category::Quote),
            links: self.get(Category::Link),
            conversations: self.get(Category::Conversation),
            photo_meta: self.get(Category::PhotoMeta),
            video_meta: self.get(Category::VideoMeta),
            audio_meta: self.get(Category::AudioMeta),
        }
    }
}

fn persisted(counts: &DownloadedCounts, category: Category) -> u32 {
    match category {
        Category::Photo => counts.photos,
        Category::Video => counts.videos,
        Category::Audio => counts.audios,
        Category::Text => counts.texts,
        Category::Quote => counts.quotes,
        Category::Link => counts.links,
        Category::Conversation => counts.conversations,
        Category::PhotoMeta => counts.photo_meta,
        Category::VideoMeta => counts.video_meta,
        Category::AudioMeta => counts.audio_meta,
    }
}

/// Whole-number percentage of `done` over `total`, capped at 100.
#[must_use]
pub fn percentage(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (u64::from(done) * 100 / u64::from(total)).min(100);
    u8::try_from(percent).unwrap_or(100)
}
