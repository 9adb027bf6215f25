//! Per-blog set of identifiers that have already been fetched.
//!
//! The ledger is append-only: an identifier is committed once its transfer
//! succeeds and is never removed afterwards. Before a transfer starts the
//! identifier is *claimed*; a claim blocks concurrent claims of the same
//! identifier and is released without a trace when the transfer fails, so
//! the item is retried on the next crawl.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

#[derive(Debug, Default)]
struct LedgerState {
    committed: HashSet<String>,
    /// Commit order, used when the ledger is persisted.
    order: Vec<String>,
    in_flight: HashSet<String>,
}

/// Shared, cloneable handle to one blog's ledger.
#[derive(Debug, Clone, Default)]
pub struct LinkLedger {
    state: Arc<Mutex<LedgerState>>,
}

/// Result of [`LinkLedger::claim`].
#[derive(Debug)]
#[must_use]
pub enum Claim {
    /// The identifier is committed or another transfer holds it.
    AlreadyHave,
    /// The caller owns the identifier until the claim is committed or dropped.
    New(LedgerClaim),
}

/// Exclusive right to transfer one identifier.
///
/// Dropping the claim without calling [`LedgerClaim::commit`] releases it.
#[derive(Debug)]
pub struct LedgerClaim {
    ledger: LinkLedger,
    identifier: String,
    committed: bool,
}

impl LinkLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from its persisted form, keeping the first
    /// occurrence of duplicated identifiers.
    #[must_use]
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = LedgerState::default();
        for link in links {
            if state.committed.insert(link.clone()) {
                state.order.push(link);
            }
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether `identifier` has been committed.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.lock().committed.contains(identifier)
    }

    /// Number of committed identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns true when nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically tests and reserves `identifier`.
    pub fn claim(&self, identifier: &str) -> Claim {
        let mut state = self.lock();
        if state.committed.contains(identifier) || state.in_flight.contains(identifier) {
            return Claim::AlreadyHave;
        }
        state.in_flight.insert(identifier.to_string());
        trace!(identifier, "claimed ledger entry");
        Claim::New(LedgerClaim {
            ledger: self.clone(),
            identifier: identifier.to_string(),
            committed: false,
        })
    }

    /// Committed identifiers in commit order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().order.clone()
    }
}

impl LedgerClaim {
    /// The claimed identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Records the identifier as fetched.
    pub fn commit(mut self) {
        let mut state = self.ledger.lock();
        state.in_flight.remove(&self.identifier);
        if state.committed.insert(self.identifier.clone()) {
            state.order.push(self.identifier.clone());
        }
        self.committed = true;
    }
}

impl Drop for LedgerClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.lock().in_flight.remove(&self.identifier);
            trace!(identifier = %self.identifier, "released ledger claim");
        }
    }
}
