//! Types that represent the core data model, such as `Transaction` and `Money`.

mod amount;
mod transaction;

pub use amount::{Money, BASE_CURRENCY};
pub use transaction::{
    Origin, Transaction, TransactionDraft, TransactionId, TransactionKind, TransactionPatch,
    UserId,
};
