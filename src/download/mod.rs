//! Throttled HTTP transport and item transfers.
//!
//! [`ThrottledTransport`] fetches API pages and streams media to disk while
//! holding each transfer to its share of the bandwidth cap.
//! [`ItemDownloader`] turns one discovered item into a file or a text line,
//! consulting the blog's link ledger first.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use blogcrawl_core::download::{BandwidthLimit, ThrottledTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ThrottledTransport::new(
//!     Duration::from_secs(120),
//!     BandwidthLimit::from_settings(800, 4),
//! )?;
//! let bytes = transport
//!     .download_to_file("https://64.media.tumblr.com/x_1280.jpg", "Blogs/staff/x_1280.jpg".as_ref())
//!     .await?;
//! println!("{bytes} bytes");
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod error;
mod filename;
mod item;
mod throttle;
mod transport;

pub use error::TransferError;
pub use item::{DownloadOutcome, ItemDownloader};
pub use throttle::{BandwidthLimit, Throttle};
pub use transport::ThrottledTransport;

// Note: no module-local Result alias. Use `Result<T, TransferError>` explicitly.
