//! Pending queue and active set of the crawl scheduler.
//!
//! Two lists, each behind its own mutex:
//! - *pending*: blogs waiting for a crawl or being crawled, in enqueue order
//! - *active*: the subset currently owned by a running crawl job
//!
//! Every active blog is also pending; a blog leaves *pending* only once its
//! job has finished. Whenever both locks are needed they are taken pending
//! first, then active. Enqueue and dequeue touch only *pending*.
//!
//! Every mutation wakes tasks waiting in [`CrawlQueue::changed`] or
//! [`CrawlQueue::drained`].

mod error;
mod item;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{debug, instrument};

use crate::blog::BlogHandle;

pub use error::QueueError;
pub use item::QueueItem;

#[derive(Debug, Default)]
struct QueueInner {
    pending: Mutex<Vec<QueueItem>>,
    active: Mutex<Vec<QueueItem>>,
    changed: Notify,
}

/// Shared handle to the queue; clones refer to the same lists.
#[derive(Debug, Clone, Default)]
pub struct CrawlQueue {
    inner: Arc<QueueInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CrawlQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a blog unless it is already pending. Returns whether it was
    /// added.
    #[instrument(skip(self, blog), fields(blog = %blog.name()))]
    pub fn enqueue(&self, blog: BlogHandle) -> bool {
        let added = {
            let mut pending = lock(&self.inner.pending);
            if pending.iter().any(|item| item.is_for(&blog)) {
                false
            } else {
                pending.push(QueueItem::new(blog));
                true
            }
        };
        if added {
            debug!("enqueued");
            self.inner.changed.notify_waiters();
        }
        added
    }

    /// Enqueues several blogs in order, returning how many were added.
    pub fn enqueue_all<I>(&self, blogs: I) -> usize
    where
        I: IntoIterator<Item = BlogHandle>,
    {
        blogs
            .into_iter()
            .filter(|blog| self.enqueue(blog.clone()))
            .count()
    }

    /// Removes a blog that is waiting. Returns `Ok(false)` if it was not
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Active`] while a crawl of the blog is running.
    pub fn dequeue(&self, name: &str) -> Result<bool, QueueError> {
        let removed = {
            let mut pending = lock(&self.inner.pending);
            let active = lock(&self.inner.active);
            if active.iter().any(|item| item.name() == name) {
                return Err(QueueError::Active(name.to_string()));
            }
            let before = pending.len();
            pending.retain(|item| item.name() != name);
            before != pending.len()
        };
        if removed {
            self.inner.changed.notify_waiters();
        }
        Ok(removed)
    }

    /// Moves the first pending blog that is not active into the active set.
    #[must_use]
    pub fn claim_next(&self) -> Option<ActiveLease> {
        let item = {
            let pending = lock(&self.inner.pending);
            let mut active = lock(&self.inner.active);
            let next = pending
                .iter()
                .find(|item| !active.iter().any(|a| a.is_for(item.blog())))?
                .clone();
            active.push(next.clone());
            next
        };
        debug!(blog = %item.name(), "claimed blog");
        Some(ActiveLease {
            queue: self.clone(),
            item,
            settled: false,
        })
    }

    /// Pending entries in order (active ones included).
    #[must_use]
    pub fn pending(&self) -> Vec<QueueItem> {
        lock(&self.inner.pending).clone()
    }

    /// Entries currently being crawled.
    #[must_use]
    pub fn active(&self) -> Vec<QueueItem> {
        lock(&self.inner.active).clone()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.inner.active).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }

    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        lock(&self.inner.active).iter().any(|item| item.name() == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.pending).iter().any(|item| item.name() == name)
    }

    /// Consistent view of (pending, active) names taken under both locks.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<String>, Vec<String>) {
        let pending = lock(&self.inner.pending);
        let active = lock(&self.inner.active);
        (
            pending.iter().map(|item| item.name().to_string()).collect(),
            active.iter().map(|item| item.name().to_string()).collect(),
        )
    }

    /// Future that resolves on the next queue mutation. Call
    /// [`Notified::enable`] on it before inspecting the queue to avoid
    /// missing a wakeup.
    pub fn changed(&self) -> Notified<'_> {
        self.inner.changed.notified()
    }

    /// Waits until no blog is pending.
    pub async fn drained(&self) {
        loop {
            let changed = self.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.is_empty() {
                return;
            }
            changed.await;
        }
    }

    fn settle(&self, item: &QueueItem, completed: bool) {
        {
            let mut pending = lock(&self.inner.pending);
            let mut active = lock(&self.inner.active);
            active.retain(|a| !a.is_for(item.blog()));
            if completed {
                pending.retain(|p| !p.is_for(item.blog()));
            }
        }
        debug!(blog = %item.name(), completed, "released blog");
        self.inner.changed.notify_waiters();
    }
}

/// Membership of one blog in the active set.
///
/// Dropping the lease without settling it releases the blog back to the
/// waiting part of the queue.
#[derive(Debug)]
pub struct ActiveLease {
    queue: CrawlQueue,
    item: QueueItem,
    settled: bool,
}

impl ActiveLease {
    #[must_use]
    pub fn item(&self) -> &QueueItem {
        &self.item
    }

    /// The job finished: remove the blog from both lists.
    pub fn complete(mut self) {
        self.queue.settle(&self.item, true);
        self.settled = true;
    }

    /// The job was cancelled: leave the blog pending.
    pub fn release(mut self) {
        self.queue.settle(&self.item, false);
        self.settled = true;
    }
}

impl Drop for ActiveLease {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.settle(&self.item, false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blog::Blog;
    use crate::config::CrawlSettings;

    fn blog(name: &str) -> BlogHandle {
        BlogHandle::from_blog(Blog::new(name, &CrawlSettings::default()))
    }

    fn assert_active_within_pending(queue: &CrawlQueue) {
        let (pending, active) = queue.snapshot();
        for name in &active {
            assert!(pending.contains(name), "{name} active but not pending");
        }
    }

    #[test]
    fn test_enqueue_rejects_duplicates() {
        let queue = CrawlQueue::new();
        let a = blog("a");
        assert!(queue.enqueue(a.clone()));
        assert!(!queue.enqueue(a));
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_claim_next_skips_active_blogs() {
        let queue = CrawlQueue::new();
        queue.enqueue_all([blog("a"), blog("b")]);

        let first = queue.claim_next().unwrap();
        let second = queue.claim_next().unwrap();
        assert_eq!(first.item().name(), "a");
        assert_eq!(second.item().name(), "b");
        assert!(queue.claim_next().is_none());
        assert_active_within_pending(&queue);
    }

    #[test]
    fn test_complete_removes_from_both_lists() {
        let queue = CrawlQueue::new();
        queue.enqueue(blog("a"));
        queue.claim_next().unwrap().complete();
        assert!(queue.is_empty());
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn test_release_keeps_blog_pending() {
        let queue = CrawlQueue::new();
        queue.enqueue(blog("a"));
        queue.claim_next().unwrap().release();
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn test_dropped_lease_releases_blog() {
        let queue = CrawlQueue::new();
        queue.enqueue(blog("a"));
        drop(queue.claim_next().unwrap());
        assert!(!queue.is_active("a"));
        assert!(queue.contains("a"));
    }

    #[test]
    fn test_dequeue_refuses_active_blog() {
        let queue = CrawlQueue::new();
        queue.enqueue(blog("a"));
        queue.enqueue(blog("b"));
        let _lease = queue.claim_next().unwrap();

        assert_eq!(queue.dequeue("a"), Err(QueueError::Active("a".into())));
        assert_eq!(queue.dequeue("b"), Ok(true));
        assert_eq!(queue.dequeue("b"), Ok(false));
        assert_active_within_pending(&queue);
    }

    #[test]
    fn test_racing_claims_never_share_a_blog() {
        let queue = CrawlQueue::new();
        queue.enqueue_all((0..20).map(|i| blog(&format!("b{i}"))));

        let claimed: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let queue = queue.clone();
                    scope.spawn(move || {
                        let mut names = Vec::new();
                        let mut leases = Vec::new();
                        while let Some(lease) = queue.claim_next() {
                            names.push(lease.item().name().to_string());
                            leases.push(lease);
                        }
                        std::mem::forget(leases);
                        names
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut unique = claimed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), claimed.len());
        assert_eq!(claimed.len(), 20);
        assert_active_within_pending(&queue);
    }

    #[tokio::test]
    async fn test_drained_resolves_after_last_completion() {
        let queue = CrawlQueue::new();
        queue.enqueue(blog("a"));
        let lease = queue.claim_next().unwrap();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drained().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        lease.complete();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_changed_wakes_on_enqueue() {
        let queue = CrawlQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let changed = queue.changed();
                tokio::pin!(changed);
                changed.as_mut().enable();
                changed.await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(blog("a"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
