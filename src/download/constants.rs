//! Constants for the transfer layer (timeouts, throttling).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout when the settings don't override it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Bytes per configured bandwidth unit (settings are in KiB/s).
pub const BYTES_PER_KIB: u64 = 1024;

/// Throttle sleeps shorter than this are skipped to avoid timer churn.
pub const MIN_THROTTLE_SLEEP: Duration = Duration::from_millis(5);

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("blogcrawl/", env!("CARGO_PKG_VERSION"));
