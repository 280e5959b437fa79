//! The composition root: one engine per signed-in user.
//!
//! `LedgerEngine::start` fetches the initial ledger, subscribes to the
//! change feed, and wires the mutation coordinator and reconciler to a
//! single shared cache. Every committed cache change publishes a freshly
//! recomputed [`AggregateSnapshot`] over a `watch` channel, which is the
//! presentation layer's whole view of the engine.

use crate::aggregate::{aggregate, AggregateSnapshot};
use crate::api::{ChangeFeed, RemoteStore};
use crate::budget::{
    evaluate_budget, goal_progress, BudgetReading, BudgetState, GoalProgress, GoalState,
};
use crate::cache::{LedgerCache, LedgerSnapshot};
use crate::coordinator::{MutationCoordinator, PendingMutation};
use crate::model::{Transaction, TransactionDraft, TransactionId, TransactionPatch, UserId};
use crate::reconciler;
use crate::{Config, Error, Result};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// State shared by the two writer lanes (coordinator and reconciler) and
/// the snapshot publisher. The cache sits behind one mutex, so even with
/// two producers there is exactly one logical writer: `apply` calls are
/// totally ordered and readers never observe a partial change.
pub(crate) struct Shared {
    pub(crate) user_id: UserId,
    cache: Mutex<LedgerCache>,
    snapshots: watch::Sender<AggregateSnapshot>,
}

impl Shared {
    /// Runs `f` against the cache and, if the revision moved, publishes a
    /// recomputed aggregate snapshot. One publication per call, even when
    /// `f` applies several changes.
    pub(crate) async fn with_cache<R>(&self, f: impl FnOnce(&mut LedgerCache) -> R) -> R {
        let mut cache = self.cache.lock().await;
        let before = cache.revision();
        let out = f(&mut cache);
        if cache.revision() != before {
            // Published while still holding the lock, so snapshots reach the
            // channel in revision order; `send_replace` never blocks.
            self.snapshots.send_replace(aggregate(&cache.snapshot()));
        }
        out
    }

    pub(crate) async fn ledger(&self) -> LedgerSnapshot {
        self.cache.lock().await.snapshot()
    }
}

/// The reactive ledger engine for one user session.
pub struct LedgerEngine {
    shared: Arc<Shared>,
    coordinator: Arc<MutationCoordinator>,
    reconciler: JoinHandle<()>,
}

impl LedgerEngine {
    /// Fetches the user's ledger, subscribes to the change feed, and starts
    /// the reconciler.
    pub async fn start(
        config: &Config,
        store: Arc<dyn RemoteStore>,
        feed: Arc<dyn ChangeFeed>,
        user_id: UserId,
    ) -> Result<Self> {
        debug!("starting ledger engine for user '{user_id}'");
        // Subscribed before the initial fetch: a change committed while the
        // fetch is in flight is buffered on the subscription and reconciled
        // idempotently afterwards instead of being lost.
        let subscription = feed.subscribe(&user_id).await?;
        let initial = store.fetch_all(&user_id).await?;
        let mut cache = LedgerCache::new(user_id.clone());
        cache.load(initial);
        let (snapshots, _) = watch::channel(aggregate(&cache.snapshot()));
        let shared = Arc::new(Shared {
            user_id: user_id.clone(),
            cache: Mutex::new(cache),
            snapshots,
        });

        let reconciler = reconciler::spawn(
            Arc::clone(&shared),
            Arc::clone(&store),
            subscription,
            config.feed_retry(),
        );
        let coordinator = Arc::new(MutationCoordinator::new(
            Arc::clone(&shared),
            store,
            config.submit_timeout(),
        ));
        Ok(Self {
            shared,
            coordinator,
            reconciler,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.shared.user_id
    }

    /// A receiver of aggregate snapshots; a new value arrives after every
    /// committed ledger change.
    pub fn snapshots(&self) -> watch::Receiver<AggregateSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// The most recently published aggregate snapshot.
    pub fn latest(&self) -> AggregateSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// An immutable view of the raw ledger, newest first.
    pub async fn ledger(&self) -> LedgerSnapshot {
        self.shared.ledger().await
    }

    /// Adds a transaction optimistically and submits it to the store.
    ///
    /// The submission runs on its own task: abandoning the returned future
    /// does not cancel the write, it still runs to completion and is
    /// reconciled normally.
    pub async fn add(&self, draft: TransactionDraft) -> Result<Transaction> {
        let coordinator = Arc::clone(&self.coordinator);
        join(tokio::spawn(async move { coordinator.add(draft).await })).await
    }

    /// Patches a transaction optimistically and submits the patch.
    pub async fn update(&self, id: TransactionId, patch: TransactionPatch) -> Result<Transaction> {
        let coordinator = Arc::clone(&self.coordinator);
        join(tokio::spawn(async move { coordinator.update(id, patch).await })).await
    }

    /// Deletes a transaction optimistically and submits the delete.
    pub async fn delete(&self, id: TransactionId) -> Result<()> {
        let coordinator = Arc::clone(&self.coordinator);
        join(tokio::spawn(async move { coordinator.delete(id).await })).await
    }

    /// The optimistic writes currently awaiting remote resolution.
    pub async fn pending(&self) -> Vec<PendingMutation> {
        self.coordinator.pending().await
    }

    /// Evaluates a budget against the latest aggregate snapshot.
    pub fn budget_status(&self, budget: &BudgetState) -> Option<BudgetReading> {
        evaluate_budget(&self.latest(), budget)
    }

    /// Computes goal progress against the latest aggregate snapshot.
    pub fn goal_status(&self, goal: &GoalState) -> Option<GoalProgress> {
        goal_progress(&self.latest(), goal)
    }

    /// Stops the reconciler (dropping its feed subscription) and releases
    /// the cache.
    pub async fn shutdown(self) {
        debug!("shutting down ledger engine for user '{}'", self.shared.user_id);
        self.reconciler.abort();
    }
}

impl Drop for LedgerEngine {
    fn drop(&mut self) {
        // Teardown must not depend on the caller remembering `shutdown`.
        self.reconciler.abort();
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(Error::Internal(format!("submission task failed: {e}"))),
    }
}
