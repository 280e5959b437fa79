//! The transaction record and the intent types used to mutate it.

use crate::model::Money;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix for ids assigned to optimistic entries before the server has
/// returned a canonical record.
const LOCAL_ID_PREFIX: &str = "local-";

/// Identifies a transaction. Server-assigned ids are immutable; optimistic
/// entries carry a temporary `local-` id until confirmation.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh temporary id for an optimistic entry.
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// True if this id was assigned locally and not yet confirmed.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifies the owner of a ledger. Threaded explicitly through every cache
/// and reconciler operation so that stale subscriptions after a user switch
/// can never leak records across sessions.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Whether a transaction adds to or subtracts from the balance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

serde_plain::derive_display_from_serialize!(TransactionKind);
serde_plain::derive_fromstr_from_deserialize!(TransactionKind);

/// Where a cached copy of a record came from. Ties in last-write-wins
/// resolution prefer the remotely-confirmed copy over an optimistic one.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Origin {
    /// Applied optimistically, not yet confirmed by the remote store.
    Local,
    /// Confirmed by, or received from, the remote store.
    #[default]
    Remote,
}

/// A single ledger record.
///
/// The wire shape matches the remote store's `transactions` table: `kind` is
/// serialized as `type`, dates as ISO-8601. `origin` is local bookkeeping and
/// never crosses the wire.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Money,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub transaction_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub origin: Origin,
}

impl Transaction {
    /// Returns a copy with `patch` overlaid and `updated_at` set to `now`.
    pub fn with_patch(&self, patch: &TransactionPatch, now: DateTime<Utc>) -> Transaction {
        let mut tx = self.clone();
        if let Some(kind) = patch.kind {
            tx.kind = kind;
        }
        if let Some(amount) = patch.amount {
            tx.amount = amount;
        }
        if let Some(category) = &patch.category {
            tx.category = category.clone();
        }
        if let Some(description) = &patch.description {
            tx.description = Some(description.clone());
        }
        if let Some(notes) = &patch.notes {
            tx.notes = Some(notes.clone());
        }
        if let Some(transaction_date) = patch.transaction_date {
            tx.transaction_date = transaction_date;
        }
        tx.updated_at = now;
        tx
    }
}

/// User intent to add a transaction. Validated before it touches the cache
/// or the network.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Money,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub transaction_date: NaiveDate,
}

impl TransactionDraft {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(Error::Validation(format!(
                "amount must be greater than zero, got {}",
                self.amount
            )));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation("category must not be empty".to_string()));
        }
        Ok(())
    }
}

/// User intent to change an existing transaction. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<NaiveDate>,
}

impl TransactionPatch {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            if !amount.is_positive() {
                return Err(Error::Validation(format!(
                    "amount must be greater than zero, got {amount}"
                )));
            }
        }
        if let Some(category) = &self.category {
            if category.trim().is_empty() {
                return Err(Error::Validation("category must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
