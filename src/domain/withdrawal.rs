//! Withdrawal domain types.

use super::{Amount, TimeMs, UserId};

/// Lifecycle of an outbound transfer.
///
/// `pending -> broadcasting -> completed | failed`, or `pending -> failed`
/// on pre-broadcast validation failure. `completed` and `failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WithdrawalStatus {
    Pending,
    Broadcasting,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Broadcasting => "broadcasting",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "broadcasting" => Some(WithdrawalStatus::Broadcasting),
            "completed" => Some(WithdrawalStatus::Completed),
            "failed" => Some(WithdrawalStatus::Failed),
            _ => None,
        }
    }
}

/// An outbound transfer tracked against the external signer collaborator.
///
/// Funds (amount + fee) are debited at request time so a racing second
/// request cannot double-spend; a failed withdrawal is compensated by a
/// `refund` ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub withdrawal_id: String,
    pub user_id: UserId,
    pub amount: Amount,
    pub fee: Amount,
    pub destination_address: String,
    pub status: WithdrawalStatus,
    /// Set once the signer reports the broadcast.
    pub transaction_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Withdrawal {
    /// Total debited from the account for this withdrawal.
    pub fn total_debit(&self) -> Amount {
        self.amount + self.fee
    }
}
