//! Blog-level worker pool.
//!
//! [`CrawlScheduler::start`] spawns `parallel_blogs` workers that repeatedly
//! claim the first pending blog nobody is crawling and run a
//! [`BlogCrawlJob`] for it. An idle worker sleeps until the queue changes,
//! the session is paused or stopped, or a fixed recheck interval elapses.
//!
//! Workers end with [`CrawlError::Cancelled`] once the session is stopped;
//! [`CrawlScheduler::join`] treats that as the normal end of a session.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::crawl::{BlogCrawlJob, CrawlContext, CrawlError};
use crate::queue::CrawlQueue;
use crate::session::CrawlSession;

/// How long an idle worker waits before looking at the queue again.
pub const QUEUE_RECHECK_INTERVAL: Duration = Duration::from_secs(4);

/// Errors from scheduler control operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("a crawl session is already running")]
    AlreadyRunning,

    #[error("no crawl session is running")]
    NotRunning,
}

/// Outcome of joining a session's workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinSummary {
    pub workers: usize,
    /// Workers that ended with something other than cancellation.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct SchedulerState {
    session: Option<CrawlSession>,
    workers: Vec<JoinHandle<Result<(), CrawlError>>>,
}

/// Runs crawl jobs for queued blogs on a fixed number of workers.
#[derive(Debug)]
pub struct CrawlScheduler {
    ctx: CrawlContext,
    queue: CrawlQueue,
    state: Mutex<SchedulerState>,
}

impl CrawlScheduler {
    #[must_use]
    pub fn new(ctx: CrawlContext, queue: CrawlQueue) -> Self {
        Self {
            ctx,
            queue,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn queue(&self) -> &CrawlQueue {
        &self.queue
    }

    /// The running session, if any.
    #[must_use]
    pub fn session(&self) -> Option<CrawlSession> {
        self.state().session.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().session.is_some()
    }

    /// Creates a fresh session and spawns `concurrency` workers for it.
    /// Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] until the previous session
    /// has been joined.
    #[instrument(skip(self))]
    pub fn start(&self, concurrency: usize) -> Result<CrawlSession, SchedulerError> {
        let mut state = self.state();
        if state.session.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let session = CrawlSession::new();
        let concurrency = concurrency.max(1);
        state.workers = (0..concurrency)
            .map(|worker| {
                let ctx = self.ctx.clone();
                let queue = self.queue.clone();
                let session = session.clone();
                tokio::spawn(async move { worker_loop(worker, ctx, queue, session).await })
            })
            .collect();
        state.session = Some(session.clone());
        info!(concurrency, "crawl session started");
        Ok(session)
    }

    /// Closes the pause gate and waits until no worker is about to start a
    /// transfer. Transfers already under way may still finish.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        let session = self.session().ok_or(SchedulerError::NotRunning)?;
        session.pause_token().pause().await;
        info!("crawl session paused");
        Ok(())
    }

    /// Reopens the pause gate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub fn resume(&self) -> Result<(), SchedulerError> {
        let session = self.session().ok_or(SchedulerError::NotRunning)?;
        session.pause_token().resume();
        info!("crawl session resumed");
        Ok(())
    }

    /// Signals every worker to stop. Call [`CrawlScheduler::join`]
    /// afterwards to wait for them.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] without a session.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        let session = self.session().ok_or(SchedulerError::NotRunning)?;
        session.stop();
        info!("crawl session stopping");
        Ok(())
    }

    /// Waits for every worker of the current session, then forgets the
    /// session so a new one can be started.
    pub async fn join(&self) -> JoinSummary {
        let workers = std::mem::take(&mut self.state().workers);
        let mut summary = JoinSummary {
            workers: workers.len(),
            failed: 0,
        };

        for handle in workers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(CrawlError::Cancelled)) => debug!("worker cancelled"),
                Ok(Err(e)) => {
                    error!(error = %e, "worker failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "worker task panicked");
                    summary.failed += 1;
                }
            }
        }

        self.state().session = None;
        debug!(workers = summary.workers, "crawl session joined");
        summary
    }
}

#[instrument(skip(ctx, queue, session))]
async fn worker_loop(
    worker: usize,
    ctx: CrawlContext,
    queue: CrawlQueue,
    session: CrawlSession,
) -> Result<(), CrawlError> {
    let cancel = session.cancel_token();
    let pause = session.pause_token();

    loop {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        if pause.is_paused() {
            tokio::select! {
                () = pause.wait_while_paused() => {}
                () = cancel.cancelled() => {}
            }
            continue;
        }

        let changed = queue.changed();
        tokio::pin!(changed);
        changed.as_mut().enable();

        let Some(lease) = queue.claim_next() else {
            tokio::select! {
                () = changed => {}
                () = cancel.cancelled() => {}
                () = pause.paused() => {}
                () = tokio::time::sleep(QUEUE_RECHECK_INTERVAL) => {}
            }
            continue;
        };

        let job = BlogCrawlJob::new(
            ctx.clone(),
            queue.clone(),
            lease.item().clone(),
            session.clone(),
        );
        match job.run().await {
            Ok(report) => {
                debug!(blog = %lease.item().name(), progress = report.progress, "job finished");
                lease.complete();
            }
            Err(CrawlError::Cancelled) => {
                lease.release();
                return Err(CrawlError::Cancelled);
            }
            Err(e) => {
                error!(blog = %lease.item().name(), error = %e, "crawl failed");
                lease.complete();
            }
        }
    }
}
