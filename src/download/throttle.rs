//! Per-transfer bandwidth throttling.
//!
//! The configured bandwidth cap is split evenly across the configured number
//! of parallel item transfers: with a cap of `L` KiB/s and `N` parallel
//! transfers, each transfer is held to `L / N` KiB/s. Transfers do not
//! coordinate with each other, so the aggregate only approximates the cap
//! when fewer than `N` transfers are running.
//!
//! # Example
//!
//! ```
//! use blogcrawl_core::download::BandwidthLimit;
//!
//! // 1000 KiB/s shared by 4 transfers => 256000 B/s each
//! let limit = BandwidthLimit::from_settings(1000, 4);
//! assert_eq!(limit.bytes_per_sec(), Some(256_000));
//!
//! // 0 disables throttling
//! assert!(BandwidthLimit::from_settings(0, 4).is_unlimited());
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::constants::{BYTES_PER_KIB, MIN_THROTTLE_SLEEP};

/// Bytes-per-second budget applied to each logical transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthLimit {
    bytes_per_sec: Option<u64>,
}

impl BandwidthLimit {
    /// A limit that never sleeps.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            bytes_per_sec: None,
        }
    }

    /// Derives the per-transfer share from the global cap (KiB/s) and the
    /// parallel item setting. A cap of zero means unlimited.
    #[must_use]
    pub fn from_settings(bandwidth_kbps: u64, parallel_images: usize) -> Self {
        if bandwidth_kbps == 0 {
            return Self::unlimited();
        }
        let divisor = u64::try_from(parallel_images.max(1)).unwrap_or(u64::MAX);
        let share = bandwidth_kbps.saturating_mul(BYTES_PER_KIB) / divisor;
        Self {
            bytes_per_sec: Some(share.max(1)),
        }
    }

    /// Returns the per-transfer budget, or `None` when unlimited.
    #[must_use]
    pub fn bytes_per_sec(&self) -> Option<u64> {
        self.bytes_per_sec
    }

    /// Returns whether throttling is disabled.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.bytes_per_sec.is_none()
    }

    /// Starts the accounting for one transfer.
    #[must_use]
    pub fn start(&self) -> Throttle {
        Throttle {
            bytes_per_sec: self.bytes_per_sec,
            started: Instant::now(),
            consumed: 0,
        }
    }
}

impl Default for BandwidthLimit {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Accounting for a single in-flight transfer.
///
/// After each chunk the throttle compares the bytes seen so far against the
/// time they would have taken at the budgeted rate and sleeps off the
/// difference.
#[derive(Debug)]
pub struct Throttle {
    bytes_per_sec: Option<u64>,
    started: Instant,
    consumed: u64,
}

impl Throttle {
    /// Records `bytes` and waits if the transfer is ahead of its budget.
    pub async fn consume(&mut self, bytes: usize) {
        let Some(limit) = self.bytes_per_sec else {
            return;
        };

        self.consumed = self
            .consumed
            .saturating_add(u64::try_from(bytes).unwrap_or(u64::MAX));

        #[allow(clippy::cast_precision_loss)]
        let expected = Duration::from_secs_f64(self.consumed as f64 / limit as f64);
        let elapsed = self.started.elapsed();

        if expected > elapsed {
            let delay = expected - elapsed;
            if delay >= MIN_THROTTLE_SLEEP {
                trace!(
                    consumed = self.consumed,
                    delay_ms = delay.as_millis(),
                    "throttling transfer"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Total bytes recorded so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}
