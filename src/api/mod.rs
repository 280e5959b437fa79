//! Collaborator contracts at the edge of the engine: the remote store and
//! the change-notification feed.
//!
//! The engine only ever talks to these traits. The production client
//! ([`RestStore`]) speaks HTTP; [`TestStore`] keeps everything in memory so
//! the whole engine can run, top-to-bottom, without a live backend.

mod rest;
mod test_store;

use crate::model::{Transaction, TransactionDraft, TransactionId, TransactionPatch, UserId};
use crate::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use rest::RestStore;
pub use test_store::TestStore;

/// Buffered feed events per subscription before backpressure applies.
const FEED_BUFFER: usize = 64;

/// The remote, authoritative transaction store.
///
/// Every call carries the session's user id so the server can enforce
/// ownership; the engine never treats a locally-applied filter as the sole
/// authorization boundary.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the user's full transaction set.
    async fn fetch_all(&self, user_id: &UserId) -> Result<Vec<Transaction>>;

    /// Inserts a new transaction; returns the canonical record with
    /// server-assigned id and timestamps.
    async fn insert(&self, user_id: &UserId, draft: &TransactionDraft) -> Result<Transaction>;

    /// Patches an existing transaction; returns the canonical record.
    async fn update(
        &self,
        user_id: &UserId,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction>;

    /// Deletes by id. Deleting an id that no longer exists is not an error.
    async fn remove(&self, user_id: &UserId, id: &TransactionId) -> Result<()>;
}

/// A push-based stream of change notifications scoped to one user.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, user_id: &UserId) -> Result<FeedSubscription>;
}

/// What happened to a record on the server.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "record", rename_all = "UPPERCASE")]
pub enum FeedOperation {
    Insert(Transaction),
    Update(Transaction),
    Delete { id: TransactionId },
}

/// One change notification. `scope_user_id` identifies whose ledger the
/// change belongs to; the reconciler discards events for anyone else.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(flatten)]
    pub operation: FeedOperation,
    pub scope_user_id: UserId,
}

/// A message delivered over a subscription.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Event(ChangeEvent),
    /// The transport was disrupted; missed events cannot be bounded, so the
    /// consumer should reload rather than trust a replay.
    Disrupted,
}

/// A live subscription: a lazy, infinite sequence of feed messages. Closing
/// (or dropping) the subscription unsubscribes.
#[derive(Debug)]
pub struct FeedSubscription {
    messages: mpsc::Receiver<FeedMessage>,
}

impl FeedSubscription {
    pub fn new(messages: mpsc::Receiver<FeedMessage>) -> Self {
        Self { messages }
    }

    /// Creates a subscription along with the sender half that feeds it.
    pub fn channel() -> (mpsc::Sender<FeedMessage>, Self) {
        let (sender, receiver) = mpsc::channel(FEED_BUFFER);
        (sender, Self::new(receiver))
    }

    /// Receives the next message; `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.messages.recv().await
    }

    /// Stops the subscription; senders observe a closed channel.
    pub fn close(&mut self) {
        self.messages.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::expense;

    #[test]
    fn test_change_event_wire_shape() {
        let event = ChangeEvent {
            operation: FeedOperation::Delete { id: "abc".into() },
            scope_user_id: "user-1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["operation"], "DELETE");
        assert_eq!(json["record"]["id"], "abc");
        assert_eq!(json["scope_user_id"], "user-1");

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_insert_event_carries_full_record() {
        let tx = expense("a", "12.50", "food", "2025-02-01");
        let event = ChangeEvent {
            operation: FeedOperation::Insert(tx.clone()),
            scope_user_id: tx.user_id.clone(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["operation"], "INSERT");
        assert_eq!(json["record"]["category"], "food");
    }
}
