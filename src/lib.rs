//! Client-side core of a personal finance dashboard: a locally-held ledger
//! cache kept consistent with a remote store under optimistic writes and
//! server-pushed change notifications, plus deterministic aggregation of
//! financial views (totals, category breakdowns, monthly series, budgets and
//! goals).
//!
//! The [`LedgerEngine`] is the composition root. It owns the cache, applies
//! optimistic mutations through the mutation coordinator, merges change-feed
//! events through the reconciler, and publishes a fresh [`AggregateSnapshot`]
//! on every committed change via a `tokio::sync::watch` channel.

mod aggregate;
pub mod api;
mod budget;
mod cache;
mod config;
mod coordinator;
mod engine;
mod error;
mod model;
mod reconciler;
mod session;

pub use aggregate::{aggregate, AggregateSnapshot, MonthBucket, TopCategory};
pub use budget::{
    evaluate_budget, goal_progress, BudgetReading, BudgetState, BudgetStatus, GoalProgress,
    GoalState,
};
pub use cache::{CacheChange, LedgerCache, LedgerSnapshot};
pub use config::Config;
pub use coordinator::{MutationKind, PendingMutation};
pub use engine::LedgerEngine;
pub use error::{Error, Result};
pub use model::{
    Money, Origin, Transaction, TransactionDraft, TransactionId, TransactionKind,
    TransactionPatch, UserId, BASE_CURRENCY,
};
pub use session::Session;
