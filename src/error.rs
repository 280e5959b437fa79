//! Error kinds surfaced by the engine.
//!
//! Local validation failures are rejected before any network call and never
//! touch the ledger cache. Every other kind rolls back the optimistic delta
//! it belongs to and is reported to the caller as a non-fatal notification.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Bad input, rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote store rejected the ownership check.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Transport failure talking to the remote store.
    #[error("network failure: {0}")]
    Network(String),

    /// No response from the remote store within the submission window. The
    /// write is never retried automatically; the user may resubmit.
    #[error("no response from the remote store within {0:?}")]
    Timeout(Duration),

    /// The remote record changed concurrently with a local optimistic write.
    /// Resolved by last-write-wins; informational, not a hard failure.
    #[error("superseded by a newer copy of the record")]
    ConflictStale,

    /// An operation that requires an active user session was called without
    /// one.
    #[error("no active user session")]
    NoSession,

    /// A submission task could not be joined. Only reachable if the task
    /// itself panicked.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that describe a resolved conflict rather than a
    /// failed write. Callers typically show these as notices, not failures.
    pub fn is_informational(&self) -> bool {
        matches!(self, Error::ConflictStale)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
