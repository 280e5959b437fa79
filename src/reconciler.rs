//! Merges server-pushed change notifications into the ledger cache.
//!
//! This is a reconciliation model, not an event-sourced log: the cache
//! always represents current state. Events for other users are discarded,
//! inserts and updates land last-write-wins, deletes are idempotent, and a
//! transport disruption triggers a full reload because missed events cannot
//! be assumed bounded.

use crate::api::{ChangeEvent, FeedMessage, FeedOperation, FeedSubscription, RemoteStore};
use crate::cache::CacheChange;
use crate::engine::Shared;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Starts the reconciler task. It ends when the subscription closes, and is
/// aborted by the engine on teardown.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    store: Arc<dyn RemoteStore>,
    mut subscription: FeedSubscription,
    retry: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            match message {
                FeedMessage::Event(event) => handle_event(&shared, event).await,
                FeedMessage::Disrupted => reload(&shared, store.as_ref(), retry).await,
            }
        }
        debug!("change feed closed for user '{}'", shared.user_id);
    })
}

async fn handle_event(shared: &Shared, event: ChangeEvent) {
    if event.scope_user_id != shared.user_id {
        warn!(
            scope = %event.scope_user_id,
            session = %shared.user_id,
            "discarding change event for another user"
        );
        return;
    }
    let change = match event.operation {
        FeedOperation::Insert(tx) | FeedOperation::Update(tx) => CacheChange::Insert(tx),
        FeedOperation::Delete { id } => CacheChange::Remove { id },
    };
    let applied = shared.with_cache(|cache| cache.apply(change)).await;
    trace!(applied, "change event processed");
}

/// After a disruption the only safe recovery is to replace the full set.
async fn reload(shared: &Shared, store: &dyn RemoteStore, retry: Duration) {
    warn!(
        "change feed disrupted for user '{}', reloading the ledger",
        shared.user_id
    );
    loop {
        match store.fetch_all(&shared.user_id).await {
            Ok(transactions) => {
                shared.with_cache(|cache| cache.load(transactions)).await;
                debug!("ledger reloaded for user '{}'", shared.user_id);
                return;
            }
            Err(e) => {
                warn!("ledger reload failed, retrying: {e}");
                tokio::time::sleep(retry).await;
            }
        }
    }
}
