//! The authoritative in-memory set of transaction records for the current
//! user.
//!
//! The cache is the single point of truth the rest of the engine derives
//! from. It holds at most one entry per id, admits only records belonging to
//! the session user, and bumps a monotonic revision counter on every
//! committed change so consumers can detect staleness. Conflicting writes
//! are resolved last-write-wins by `updated_at`; ties prefer the
//! remotely-confirmed copy over a locally-optimistic one.

use crate::model::{Origin, Transaction, TransactionId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// A change to apply to the cache. Both writers (the mutation coordinator
/// and the change-feed reconciler) speak this vocabulary.
#[derive(Debug, Clone)]
pub enum CacheChange {
    /// Last-write-wins upsert. Re-applying an identical `(id, updated_at)`
    /// pair is a no-op.
    Insert(Transaction),
    /// Removes `prior_id`, then installs `transaction` unconditionally.
    /// Used to swap a temporary optimistic entry for its canonical server
    /// record, and to restore a captured prior value on rollback.
    Replace {
        prior_id: TransactionId,
        transaction: Transaction,
    },
    /// Removes by id; a no-op if the id is already absent.
    Remove { id: TransactionId },
}

/// An immutable point-in-time view of the ledger: the revision it was taken
/// at plus the records ordered by date, newest first.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    revision: u64,
    transactions: Arc<[Transaction]>,
}

impl LedgerSnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Mapping from transaction id to transaction, owned exclusively by the
/// engine for the duration of a session. Mutating methods take `&mut self`,
/// so every apply is atomic with respect to readers: a snapshot never
/// observes a partially-applied change.
#[derive(Debug)]
pub struct LedgerCache {
    user_id: UserId,
    entries: HashMap<TransactionId, Transaction>,
    revision: u64,
}

impl LedgerCache {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            entries: HashMap::new(),
            revision: 0,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The monotonic revision counter, bumped once per committed change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &TransactionId) -> Option<&Transaction> {
        self.entries.get(id)
    }

    /// Replaces the full set (initial fetch, or reload after a feed
    /// disruption). Bumps the revision exactly once.
    pub fn load(&mut self, transactions: Vec<Transaction>) {
        self.entries.clear();
        for tx in transactions {
            if let Some(tx) = self.screen(tx) {
                self.entries.insert(tx.id.clone(), tx);
            }
        }
        self.revision += 1;
        trace!(
            revision = self.revision,
            entries = self.entries.len(),
            "ledger loaded"
        );
    }

    /// Applies a single change, returning whether anything changed. The
    /// revision bumps only when the answer is true.
    pub fn apply(&mut self, change: CacheChange) -> bool {
        let changed = match change {
            CacheChange::Insert(tx) => self.admit(tx),
            CacheChange::Replace {
                prior_id,
                transaction,
            } => {
                let removed = self.entries.remove(&prior_id).is_some();
                match self.screen(transaction) {
                    Some(tx) => {
                        let previous = self.entries.insert(tx.id.clone(), tx.clone());
                        removed || previous.as_ref() != Some(&tx)
                    }
                    None => removed,
                }
            }
            CacheChange::Remove { id } => self.entries.remove(&id).is_some(),
        };
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Returns an immutable view of the current state, ordered by
    /// `transaction_date` descending with deterministic tie-breaking.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut transactions: Vec<Transaction> = self.entries.values().cloned().collect();
        transactions.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        LedgerSnapshot {
            revision: self.revision,
            transactions: transactions.into(),
        }
    }

    /// Last-write-wins upsert.
    fn admit(&mut self, tx: Transaction) -> bool {
        let Some(tx) = self.screen(tx) else {
            return false;
        };
        match self.entries.get(&tx.id) {
            None => {
                self.entries.insert(tx.id.clone(), tx);
                true
            }
            Some(existing) if tx.updated_at > existing.updated_at => {
                self.entries.insert(tx.id.clone(), tx);
                true
            }
            Some(existing) if tx.updated_at == existing.updated_at => {
                // Same timestamp: the remotely-confirmed copy beats a local
                // optimistic one; an identical re-delivery is a no-op.
                if *existing == tx {
                    false
                } else if existing.origin == Origin::Local && tx.origin == Origin::Remote {
                    self.entries.insert(tx.id.clone(), tx);
                    true
                } else {
                    false
                }
            }
            Some(existing) => {
                trace!(
                    id = %tx.id,
                    incoming = %tx.updated_at,
                    held = %existing.updated_at,
                    "stale copy ignored"
                );
                false
            }
        }
    }

    /// Entries for a different user than the active session are never
    /// admitted, guarding against stale subscriptions after a user switch.
    fn screen(&self, tx: Transaction) -> Option<Transaction> {
        if tx.user_id == self.user_id {
            Some(tx)
        } else {
            warn!(
                id = %tx.id,
                owner = %tx.user_id,
                session = %self.user_id,
                "record for another user rejected"
            );
            None
        }
    }
}
