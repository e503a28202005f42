//! Ledger domain types: accounts and immutable ledger entries.
//!
//! The ledger entry log is the source of truth for every balance; the
//! `Account.balance` field is a cached fold over the log, guarded by a
//! monotonic version counter for optimistic concurrency.

use super::{Amount, TimeMs, UserId};

/// One account per user. Balance is recomputable from the ledger at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    /// Cached balance; must equal the sum of settled ledger entries.
    pub balance: Amount,
    /// Monotonic counter bumped on every balance mutation.
    pub version: i64,
    /// Affiliate id of the referrer. Immutable once set at account creation.
    pub referred_by: Option<String>,
    pub created_at: TimeMs,
}

/// Classification of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Bet,
    Payout,
    Commission,
    Refund,
}

impl EntryKind {
    /// Returns true for kinds that debit the account (amounts must be negative).
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryKind::Bet | EntryKind::Withdrawal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Bet => "bet",
            EntryKind::Payout => "payout",
            EntryKind::Commission => "commission",
            EntryKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryKind::Deposit),
            "withdrawal" => Some(EntryKind::Withdrawal),
            "bet" => Some(EntryKind::Bet),
            "payout" => Some(EntryKind::Payout),
            "commission" => Some(EntryKind::Commission),
            "refund" => Some(EntryKind::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a ledger entry.
///
/// Entries are never deleted; the only legal transitions are
/// `pending -> settled` and `pending -> reversed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Pending,
    Settled,
    Reversed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Settled => "settled",
            EntryStatus::Reversed => "reversed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "settled" => Some(EntryStatus::Settled),
            "reversed" => Some(EntryStatus::Reversed),
            _ => None,
        }
    }
}

/// Immutable fact recording one monetary movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub user_id: UserId,
    pub kind: EntryKind,
    /// Signed amount: debits negative, credits positive.
    pub amount: Amount,
    /// Links to the originating game session, withdrawal, or deposit.
    pub reference_id: String,
    pub idempotency_key: String,
    pub status: EntryStatus,
    pub created_at: TimeMs,
}

/// On-chain deposit metadata, keyed by transaction hash. The ledger entry
/// carries the money; this record carries the chain context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub tx_hash: String,
    pub user_id: UserId,
    pub amount: Amount,
    pub block_number: Option<i64>,
    pub token_type: String,
    pub created_at: TimeMs,
}
