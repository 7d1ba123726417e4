//! Local cache layer for the server-authoritative cart.
//!
//! A key/value store of cart snapshots keyed by [`SessionKey`]. The cached
//! cart is the only shared mutable state in the engine and is never mutated
//! in place: every optimistic update and every reconciliation installs a new
//! immutable `Arc<Cart>`, so concurrently rendering consumers never observe
//! torn state.
//!
//! Reads are issued against a generation ticket. Any write bumps the
//! generation, which cancels outstanding tickets - a late-arriving stale
//! read can never overwrite a newer optimistic write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::session::SessionKey;
use crate::types::Cart;

/// Snapshot store for cached carts.
#[derive(Default)]
pub struct CartStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

#[derive(Default)]
struct Entry {
    cart: Option<Arc<Cart>>,
    /// Bumped on every write or cancellation; read tickets carry the value
    /// they were issued against and die when it moves.
    write_generation: u64,
    /// Set after a mutation settles; the next read must refetch.
    stale: bool,
}

/// Ticket for one in-flight cached read.
///
/// Redeem with [`CartStore::complete_read`]; the result is discarded if any
/// write or cancellation happened after the ticket was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    key: SessionKey,
    generation: u64,
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, key: &SessionKey, f: impl FnOnce(&mut Entry) -> R) -> R {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(entries.entry(key.clone()).or_default())
    }

    /// The current cached snapshot, if any.
    #[must_use]
    pub fn snapshot(&self, key: &SessionKey) -> Option<Arc<Cart>> {
        self.with_entry(key, |entry| entry.cart.clone())
    }

    /// Whether the cached snapshot (or its absence) requires a refetch.
    #[must_use]
    pub fn needs_refetch(&self, key: &SessionKey) -> bool {
        self.with_entry(key, |entry| entry.stale || entry.cart.is_none())
    }

    /// Issue a generation ticket for an in-flight read.
    #[must_use]
    pub fn begin_read(&self, key: &SessionKey) -> ReadTicket {
        self.with_entry(key, |entry| ReadTicket {
            key: key.clone(),
            generation: entry.write_generation,
        })
    }

    /// Install the result of a read, unless a write cancelled the ticket.
    ///
    /// Returns the installed snapshot, or `None` if the ticket is stale and
    /// the result was discarded.
    pub fn complete_read(&self, ticket: &ReadTicket, cart: Cart) -> Option<Arc<Cart>> {
        self.with_entry(&ticket.key, |entry| {
            if entry.write_generation != ticket.generation {
                return None;
            }
            let snapshot = Arc::new(cart);
            entry.cart = Some(snapshot.clone());
            entry.stale = false;
            Some(snapshot)
        })
    }

    /// Cancel any in-flight reads without touching the cached snapshot.
    ///
    /// Called before every optimistic write so a stale response cannot
    /// clobber it.
    pub fn cancel_reads(&self, key: &SessionKey) {
        self.with_entry(key, |entry| {
            entry.write_generation += 1;
        });
    }

    /// Install a new snapshot, cancelling outstanding reads.
    pub fn apply(&self, key: &SessionKey, cart: Cart) -> Arc<Cart> {
        self.with_entry(key, |entry| {
            entry.write_generation += 1;
            entry.stale = false;
            let snapshot = Arc::new(cart);
            entry.cart = Some(snapshot.clone());
            snapshot
        })
    }

    /// Mark the cached cart stale so the next read refetches, and cancel
    /// outstanding reads.
    pub fn invalidate(&self, key: &SessionKey) {
        self.with_entry(key, |entry| {
            entry.write_generation += 1;
            entry.stale = true;
        });
    }

    /// Invalidate every session's cached cart.
    pub fn invalidate_all(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in entries.values_mut() {
            entry.write_generation += 1;
            entry.stale = true;
        }
    }
}

// =============================================================================
// Optimistic Mutation
// =============================================================================

/// A reusable description of an optimistic cart write.
///
/// Carries the local transform matching the expected server effect where
/// that effect is safe to predict (item removal, quantity change). When the
/// effect is not safely predictable (price/tax recomputation on add), the
/// mutation carries no prediction and the UI shows the pre-mutation cart
/// until the settle-refetch converges - this avoids presenting incorrect
/// totals.
pub struct OptimisticMutation {
    predict: Option<Box<dyn Fn(&Cart) -> Cart + Send + Sync>>,
}

impl OptimisticMutation {
    /// A mutation whose server effect can be predicted locally.
    #[must_use]
    pub fn predicted(f: impl Fn(&Cart) -> Cart + Send + Sync + 'static) -> Self {
        Self {
            predict: Some(Box::new(f)),
        }
    }

    /// A mutation that relies solely on the settle-refetch.
    #[must_use]
    pub const fn refetch_only() -> Self {
        Self { predict: None }
    }

    /// The predicted post-mutation cart, if this mutation predicts one.
    #[must_use]
    pub fn predict(&self, current: &Cart) -> Option<Cart> {
        self.predict.as_ref().map(|f| f(current))
    }
}

impl std::fmt::Debug for OptimisticMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticMutation")
            .field("predicted", &self.predict.is_some())
            .finish()
    }
}
