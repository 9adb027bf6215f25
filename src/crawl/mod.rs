//! Per-blog crawl: page enumeration, item classification and the job that
//! drives both.

mod counters;
mod enumerator;
mod error;
mod item;
mod job;

pub use counters::{CrawlCounters, percentage};
pub use enumerator::{EnumerationOptions, PageHarvest, PageStats, PostEnumerator};
pub use error::CrawlError;
pub use item::{Category, FetchableItem, ItemPayload};
pub use job::{BlogCrawlJob, BlogCrawlReport, CrawlContext, ItemStats};
