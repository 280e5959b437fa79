//! Applies optimistic local mutations and reconciles them against remote
//! results.
//!
//! Each submission walks a small state machine: `Drafting -> Submitted ->
//! Confirmed | Failed`. The optimistic delta is applied to the cache before
//! the network round-trip so a fresh aggregate snapshot reaches the UI
//! immediately; confirmation swaps in the canonical server record and
//! failure rolls the delta back. Failed financial writes are never retried
//! silently.

use crate::api::RemoteStore;
use crate::cache::CacheChange;
use crate::engine::Shared;
use crate::model::{
    Origin, Transaction, TransactionDraft, TransactionId, TransactionPatch, UserId,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

/// One outstanding optimistic write, visible through
/// [`crate::LedgerEngine::pending`] until it resolves.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingMutation {
    pub local_id: Uuid,
    pub kind: MutationKind,
    pub target_id: TransactionId,
    pub submitted_at: DateTime<Utc>,
}

pub(crate) struct MutationCoordinator {
    shared: Arc<Shared>,
    store: Arc<dyn RemoteStore>,
    submit_timeout: Duration,
    /// One fair (FIFO) lock per target id: mutations on the same entity are
    /// processed strictly in submission order, so a later write waits for
    /// the earlier one to resolve before applying its optimistic delta.
    locks: Mutex<HashMap<TransactionId, Arc<Mutex<()>>>>,
    pending: Mutex<Vec<PendingMutation>>,
}

impl MutationCoordinator {
    pub(crate) fn new(
        shared: Arc<Shared>,
        store: Arc<dyn RemoteStore>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            shared,
            store,
            submit_timeout,
            locks: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn pending(&self) -> Vec<PendingMutation> {
        self.pending.lock().await.clone()
    }

    /// Optimistically adds a transaction, then submits it. On confirmation
    /// the temporary entry is atomically swapped for the canonical record;
    /// on failure it is removed again.
    pub(crate) async fn add(&self, draft: TransactionDraft) -> Result<Transaction> {
        draft.validate()?;
        let now = Utc::now();
        let optimistic = Transaction {
            id: TransactionId::local(),
            user_id: self.user_id().clone(),
            kind: draft.kind,
            amount: draft.amount,
            category: draft.category.clone(),
            description: draft.description.clone(),
            notes: draft.notes.clone(),
            transaction_date: draft.transaction_date,
            created_at: now,
            updated_at: now,
            origin: Origin::Local,
        };
        let local_id = optimistic.id.clone();

        let entity = self.entity_lock(&local_id).await;
        let _guard = entity.lock().await;
        self.shared
            .with_cache(|cache| cache.apply(CacheChange::Insert(optimistic)))
            .await;

        let ticket = self.track(MutationKind::Add, local_id.clone()).await;
        let result = self
            .submit(self.store.insert(self.user_id(), &draft))
            .await;
        self.untrack(ticket).await;

        match result {
            Ok(canonical) => {
                debug!("add confirmed as '{}'", canonical.id);
                self.confirm(&local_id, canonical.clone()).await;
                Ok(canonical)
            }
            Err(e) => {
                warn!("rolling back optimistic add: {e}");
                self.shared
                    .with_cache(|cache| cache.apply(CacheChange::Remove { id: local_id }))
                    .await;
                Err(e)
            }
        }
    }

    /// Optimistically patches a transaction, then submits the patch. On
    /// failure the captured prior value is restored, unless a newer remote
    /// copy has already replaced the optimistic entry.
    pub(crate) async fn update(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        patch.validate()?;
        let entity = self.entity_lock(&id).await;
        let _guard = entity.lock().await;

        let now = Utc::now();
        let prior = self
            .shared
            .with_cache(|cache| {
                let prior = cache.get(&id).cloned()?;
                let mut optimistic = prior.with_patch(&patch, now);
                optimistic.origin = Origin::Local;
                cache.apply(CacheChange::Insert(optimistic));
                Some(prior)
            })
            .await;
        let Some(prior) = prior else {
            return Err(Error::Validation(format!("unknown transaction '{id}'")));
        };

        let ticket = self.track(MutationKind::Update, id.clone()).await;
        let result = self
            .submit(self.store.update(self.user_id(), &id, &patch))
            .await;
        self.untrack(ticket).await;

        match result {
            Ok(canonical) => {
                debug!("update of '{id}' confirmed");
                self.confirm(&id, canonical.clone()).await;
                Ok(canonical)
            }
            Err(e) => {
                warn!("rolling back optimistic update of '{id}': {e}");
                self.rollback_to(&id, prior).await;
                Err(e)
            }
        }
    }

    /// Optimistically removes a transaction, then submits the delete. On
    /// failure the record is restored if nothing else has reappeared under
    /// its id in the meantime.
    pub(crate) async fn delete(&self, id: TransactionId) -> Result<()> {
        let entity = self.entity_lock(&id).await;
        let _guard = entity.lock().await;

        let prior = self
            .shared
            .with_cache(|cache| {
                let prior = cache.get(&id).cloned()?;
                cache.apply(CacheChange::Remove { id: id.clone() });
                Some(prior)
            })
            .await;
        let Some(prior) = prior else {
            return Err(Error::Validation(format!("unknown transaction '{id}'")));
        };

        let ticket = self.track(MutationKind::Delete, id.clone()).await;
        let result = self.submit(self.store.remove(self.user_id(), &id)).await;
        self.untrack(ticket).await;

        match result {
            Ok(()) => {
                debug!("delete of '{id}' confirmed");
                Ok(())
            }
            Err(e) => {
                warn!("rolling back optimistic delete of '{id}': {e}");
                self.shared
                    .with_cache(|cache| {
                        if cache.get(&id).is_none() {
                            cache.apply(CacheChange::Insert(prior));
                        }
                    })
                    .await;
                Err(e)
            }
        }
    }

    fn user_id(&self) -> &UserId {
        &self.shared.user_id
    }

    /// Bounds the remote round-trip. Expiry surfaces as `Error::Timeout`;
    /// the caller may resubmit deliberately, we never retry on our own.
    async fn submit<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.submit_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.submit_timeout)),
        }
    }

    /// Installs the canonical record. If our optimistic entry is still in
    /// place it is swapped atomically; if something newer has already landed
    /// (e.g. via the feed) the canonical copy competes by last-write-wins.
    async fn confirm(&self, prior_id: &TransactionId, canonical: Transaction) {
        self.shared
            .with_cache(|cache| {
                let still_ours = cache
                    .get(prior_id)
                    .map(|tx| tx.origin == Origin::Local)
                    .unwrap_or(false);
                if still_ours {
                    cache.apply(CacheChange::Replace {
                        prior_id: prior_id.clone(),
                        transaction: canonical,
                    });
                } else {
                    cache.apply(CacheChange::Insert(canonical));
                }
            })
            .await;
    }

    /// Restores the captured prior value, but only while the cache still
    /// holds our optimistic copy; a newer remote copy is left alone.
    async fn rollback_to(&self, id: &TransactionId, prior: Transaction) {
        self.shared
            .with_cache(|cache| {
                let still_ours = cache
                    .get(id)
                    .map(|tx| tx.origin == Origin::Local)
                    .unwrap_or(false);
                if still_ours {
                    cache.apply(CacheChange::Replace {
                        prior_id: id.clone(),
                        transaction: prior,
                    });
                }
            })
            .await;
    }

    async fn entity_lock(&self, id: &TransactionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Drop locks nobody is waiting on anymore.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    async fn track(&self, kind: MutationKind, target_id: TransactionId) -> Uuid {
        let local_id = Uuid::new_v4();
        self.pending.lock().await.push(PendingMutation {
            local_id,
            kind,
            target_id,
            submitted_at: Utc::now(),
        });
        local_id
    }

    async fn untrack(&self, local_id: Uuid) {
        self.pending.lock().await.retain(|p| p.local_id != local_id);
    }
}
