//! Implements the store and feed traits using in-memory data for testing.
//!
//! Note: this is compiled even in the "production" build of this crate so
//! that the whole engine can run, top-to-bottom, without a live backend.

use crate::api::{ChangeEvent, ChangeFeed, FeedMessage, FeedOperation, FeedSubscription, RemoteStore};
use crate::model::{Origin, Transaction, TransactionDraft, TransactionId, TransactionPatch, UserId};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// An implementation of `RemoteStore` and `ChangeFeed` that holds all data
/// in memory. Mutations broadcast the same change events a live backend
/// would push, so the reconciler path is exercised end to end.
#[derive(Default)]
pub struct TestStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TransactionId, Transaction>,
    subscribers: Vec<mpsc::Sender<FeedMessage>>,
    fail_next: Option<Error>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with existing records.
    pub fn seeded(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for tx in transactions {
                inner.entries.insert(tx.id.clone(), tx);
            }
        }
        store
    }

    /// Makes the next store call fail with `error`.
    pub fn fail_next(&self, error: Error) {
        self.lock().fail_next = Some(error);
    }

    /// Broadcasts an arbitrary event to all subscribers, bypassing the
    /// store. Used to simulate out-of-band server-side changes.
    pub fn push_event(&self, event: ChangeEvent) {
        self.broadcast(FeedMessage::Event(event));
    }

    /// Signals a transport disruption to all subscribers.
    pub fn disrupt(&self) {
        self.broadcast(FeedMessage::Disrupted);
    }

    /// Writes a record directly into the backing map without broadcasting,
    /// simulating a change that happened while the feed was down.
    pub fn put_silently(&self, tx: Transaction) {
        self.lock().entries.insert(tx.id.clone(), tx);
    }

    /// Returns the stored copy of a record, if any.
    pub fn record(&self, id: &TransactionId) -> Option<Transaction> {
        self.lock().entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn broadcast(&self, message: FeedMessage) {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|sender| sender.try_send(message.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only follows a panic in another test thread.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(&self) -> Result<()> {
        match self.lock().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for TestStore {
    async fn fetch_all(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.take_failure()?;
        let inner = self.lock();
        let mut transactions: Vec<Transaction> = inner
            .entries
            .values()
            .filter(|tx| &tx.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        Ok(transactions)
    }

    async fn insert(&self, user_id: &UserId, draft: &TransactionDraft) -> Result<Transaction> {
        self.take_failure()?;
        // The backend enforces the same constraints the client validates.
        if !draft.amount.is_positive() {
            return Err(Error::Validation("amount must be positive".to_string()));
        }
        let now = Utc::now();
        let tx = Transaction {
            id: TransactionId::new(Uuid::new_v4().to_string()),
            user_id: user_id.clone(),
            kind: draft.kind,
            amount: draft.amount,
            category: draft.category.clone(),
            description: draft.description.clone(),
            notes: draft.notes.clone(),
            transaction_date: draft.transaction_date,
            created_at: now,
            updated_at: now,
            origin: Origin::Remote,
        };
        self.lock().entries.insert(tx.id.clone(), tx.clone());
        self.broadcast(FeedMessage::Event(ChangeEvent {
            operation: FeedOperation::Insert(tx.clone()),
            scope_user_id: user_id.clone(),
        }));
        Ok(tx)
    }

    async fn update(
        &self,
        user_id: &UserId,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        self.take_failure()?;
        let updated = {
            let mut inner = self.lock();
            let existing = inner
                .entries
                .get(id)
                .ok_or_else(|| Error::Validation(format!("no such transaction '{id}'")))?;
            if &existing.user_id != user_id {
                return Err(Error::Authorization(format!(
                    "transaction '{id}' belongs to another user"
                )));
            }
            let updated = existing.with_patch(patch, Utc::now());
            inner.entries.insert(id.clone(), updated.clone());
            updated
        };
        self.broadcast(FeedMessage::Event(ChangeEvent {
            operation: FeedOperation::Update(updated.clone()),
            scope_user_id: user_id.clone(),
        }));
        Ok(updated)
    }

    async fn remove(&self, user_id: &UserId, id: &TransactionId) -> Result<()> {
        self.take_failure()?;
        let removed = {
            let mut inner = self.lock();
            match inner.entries.get(id) {
                Some(existing) if &existing.user_id != user_id => {
                    return Err(Error::Authorization(format!(
                        "transaction '{id}' belongs to another user"
                    )));
                }
                Some(_) => inner.entries.remove(id).is_some(),
                // Removing an already-absent record succeeds, matching the
                // filtered-delete semantics of the real backend.
                None => false,
            }
        };
        if removed {
            self.broadcast(FeedMessage::Event(ChangeEvent {
                operation: FeedOperation::Delete { id: id.clone() },
                scope_user_id: user_id.clone(),
            }));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeFeed for TestStore {
    async fn subscribe(&self, _user_id: &UserId) -> Result<FeedSubscription> {
        // Scope filtering is the reconciler's job; the test feed delivers
        // every event so cross-user discarding can be exercised.
        let (sender, subscription) = FeedSubscription::channel();
        self.lock().subscribers.push(sender);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionKind;
    use crate::test::{draft, expense, user};

    #[tokio::test]
    async fn test_insert_assigns_id_and_broadcasts() {
        let store = TestStore::new();
        let mut subscription = store.subscribe(&user()).await.unwrap();
        let tx = store
            .insert(&user(), &draft(TransactionKind::Expense, "12", "food", "2025-02-01"))
            .await
            .unwrap();
        assert!(!tx.id.is_local());
        assert_eq!(store.len(), 1);
        match subscription.recv().await {
            Some(FeedMessage::Event(event)) => {
                assert_eq!(event.scope_user_id, user());
                assert!(matches!(event.operation, FeedOperation::Insert(_)));
            }
            other => panic!("expected an insert event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_is_scoped_to_user() {
        let mut other = expense("x", "5", "food", "2025-02-01");
        other.user_id = "someone-else".into();
        let store = TestStore::seeded(vec![expense("a", "10", "food", "2025-02-01"), other]);
        let transactions = store.fetch_all(&user()).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_fail_next_fails_exactly_once() {
        let store = TestStore::new();
        store.fail_next(Error::Network("boom".to_string()));
        assert!(store.fetch_all(&user()).await.is_err());
        assert!(store.fetch_all(&user()).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_absent_succeeds_without_broadcast() {
        let store = TestStore::new();
        let mut subscription = store.subscribe(&user()).await.unwrap();
        store.remove(&user(), &"missing".into()).await.unwrap();
        store.disrupt();
        // The only message is the disruption, not a delete event.
        assert!(matches!(
            subscription.recv().await,
            Some(FeedMessage::Disrupted)
        ));
    }
}
