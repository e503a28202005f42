//! Policy engines layered on the ledger store.
//!
//! Every balance-affecting operation in the system routes through
//! [`LedgerStore::apply_entry`]; the settlement, withdrawal, and commission
//! engines are policy layers on top of that single primitive.

pub mod commission;
pub mod ledger;
pub mod locks;
pub mod payout;
pub mod settlement;
pub mod withdrawal;

pub use commission::{AffiliateStats, CommissionEngine, CommissionWithdrawal, Registration};
pub use ledger::{AccountAudit, AppliedEntry, EntryRequest, LedgerStore};
pub use locks::AccountLocks;
pub use payout::PayoutSchedule;
pub use settlement::{
    JoinOutcome, MatchReconciliation, SettlementEngine, SettlementOutcome, VoidOutcome,
};
pub use withdrawal::{WithdrawalPolicy, WithdrawalProcessor};

use crate::domain::{Amount, UserId};
use thiserror::Error;

/// Typed error surface for all ledger and state-machine operations.
///
/// Nothing is silently swallowed: every violation is reported synchronously
/// to the immediate caller. Stale version conflicts are retried internally
/// and only surface as [`LedgerError::Contention`] once the retry budget is
/// exhausted.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: balance is {balance}")]
    InsufficientFunds { balance: Amount },
    #[error("idempotency key reused with a different payload")]
    DuplicateKeyConflict,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid destination address: {0}")]
    InvalidAddress(String),
    #[error("account not found: {0}")]
    AccountNotFound(UserId),
    #[error("game session not found: {0}")]
    SessionNotFound(String),
    #[error("game session already ended")]
    SessionAlreadyEnded,
    #[error("game session was voided")]
    SessionVoid,
    #[error("insufficient pending commission: available {available}")]
    InsufficientPendingCommission { available: Amount },
    #[error("withdrawal limit exceeded")]
    WithdrawalLimitExceeded,
    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(String),
    #[error("account is contended, retry the operation")]
    Contention,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
