//! Cooperative pause and cancellation shared by every worker of a session.
//!
//! Cancellation is a [`CancellationToken`]. Pausing is a gate: work that is
//! about to start a transfer passes through [`PauseToken::checkpoint`],
//! which blocks while the session is paused and otherwise hands out a
//! [`StartTicket`], held until the request has been answered.
//! [`PauseToken::pause`] closes the gate and then waits until every
//! outstanding ticket has been dropped, so once it returns no request is
//! about to go out until [`PauseToken::resume`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct PauseInner {
    paused: watch::Sender<bool>,
    /// Tickets handed out and not yet dropped.
    starting: Mutex<usize>,
    quiesced: Notify,
}

/// Pause gate shared by all workers of a session.
#[derive(Debug, Clone)]
pub struct PauseToken {
    inner: Arc<PauseInner>,
}

/// Proof that a checkpoint passed an open gate. Drop it once the guarded
/// request has been answered.
#[derive(Debug)]
#[must_use = "a pause waits until the ticket is dropped"]
pub struct StartTicket {
    inner: Arc<PauseInner>,
}

impl Default for PauseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseToken {
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(PauseInner {
                paused,
                starting: Mutex::new(0),
                quiesced: Notify::new(),
            }),
        }
    }

    fn starting(&self) -> MutexGuard<'_, usize> {
        self.inner
            .starting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Closes the gate and waits until no checkpoint is between passing the
    /// gate and dropping its ticket.
    pub async fn pause(&self) {
        {
            let _starting = self.starting();
            self.inner.paused.send_replace(true);
        }
        debug!("pause requested");

        loop {
            let quiesced = self.inner.quiesced.notified();
            tokio::pin!(quiesced);
            quiesced.as_mut().enable();
            if *self.starting() == 0 {
                break;
            }
            quiesced.await;
        }
        debug!("all workers parked");
    }

    /// Reopens the gate and releases parked workers.
    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
        debug!("resumed");
    }

    /// Waits while paused, then admits the caller.
    pub async fn checkpoint(&self) -> StartTicket {
        let mut paused = self.inner.paused.subscribe();
        loop {
            {
                let mut starting = self.starting();
                if !*self.inner.paused.borrow() {
                    *starting += 1;
                    return StartTicket {
                        inner: Arc::clone(&self.inner),
                    };
                }
            }
            // The sender lives in `inner`, which we hold, so this cannot fail.
            let _ = paused.wait_for(|paused| !*paused).await;
        }
    }

    /// Waits until the gate is open, without taking a ticket.
    pub async fn wait_while_paused(&self) {
        let mut paused = self.inner.paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;
    }

    /// Resolves once the gate is closed.
    pub async fn paused(&self) {
        let mut paused = self.inner.paused.subscribe();
        let _ = paused.wait_for(|paused| *paused).await;
    }
}

impl Drop for StartTicket {
    fn drop(&mut self) {
        let mut starting = self
            .inner
            .starting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *starting = starting.saturating_sub(1);
        if *starting == 0 {
            self.inner.quiesced.notify_waiters();
        }
    }
}

/// One cancel/pause pair, created fresh for every start of crawling.
#[derive(Debug, Clone, Default)]
pub struct CrawlSession {
    cancel: CancellationToken,
    pause: PauseToken,
}

impl CrawlSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn pause_token(&self) -> &PauseToken {
        &self.pause
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels, then reopens the gate so parked workers wake up and see the
    /// cancellation. Cancelling first means no woken checkpoint can start a
    /// transfer.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.pause.resume();
    }
}
