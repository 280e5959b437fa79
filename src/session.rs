//! The auth boundary: tracks the current user and tears the engine down on
//! every change.
//!
//! The current user is an explicit value threaded into the engine, not
//! ambient state. Switching users (or signing out) discards all cached
//! state and unsubscribes from the change feed before anything for the next
//! user is loaded, so no record can leak across sessions.

use crate::api::{ChangeFeed, RemoteStore};
use crate::engine::LedgerEngine;
use crate::model::UserId;
use crate::{Config, Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Owns the collaborator handles and at most one active [`LedgerEngine`].
pub struct Session {
    config: Config,
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
    active: Option<LedgerEngine>,
}

impl Session {
    pub fn new(config: Config, store: Arc<dyn RemoteStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            config,
            store,
            feed,
            active: None,
        }
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.active.as_ref().map(|engine| engine.user_id())
    }

    pub fn engine(&self) -> Option<&LedgerEngine> {
        self.active.as_ref()
    }

    /// The active engine, or `Error::NoSession` when signed out.
    pub fn require_engine(&self) -> Result<&LedgerEngine> {
        self.active.as_ref().ok_or(Error::NoSession)
    }

    /// Reacts to an auth change. A no-op if `user_id` already matches the
    /// active session; otherwise the old engine is fully torn down first,
    /// then a new one is started if somebody signed in.
    pub async fn set_user(&mut self, user_id: Option<UserId>) -> Result<()> {
        if self.current_user() == user_id.as_ref() {
            return Ok(());
        }
        if let Some(engine) = self.active.take() {
            debug!("tearing down session for user '{}'", engine.user_id());
            engine.shutdown().await;
        }
        if let Some(user_id) = user_id {
            let engine = LedgerEngine::start(
                &self.config,
                Arc::clone(&self.store),
                Arc::clone(&self.feed),
                user_id,
            )
            .await?;
            self.active = Some(engine);
        }
        Ok(())
    }
}
