//! Affiliate domain types.

use super::{Amount, TimeMs, UserId};

/// Affiliate record for a user who can refer others.
///
/// Commission accrues into `pending_commission` from qualifying bets by
/// referred users; a successful commission withdrawal moves it into
/// `total_commission`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affiliate {
    pub affiliate_id: String,
    pub user_id: UserId,
    /// Unique code presented by referred users at registration.
    pub referral_code: String,
    pub commission_rate: Amount,
    pub pending_commission: Amount,
    pub total_commission: Amount,
    pub created_at: TimeMs,
}

/// Accrued commission for a single qualifying bet, keyed by the bet's
/// idempotency key so accrual is exactly-once and reversible on void.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionAccrual {
    /// Idempotency key of the bet ledger entry that produced this accrual.
    pub bet_key: String,
    pub affiliate_id: String,
    pub referred_user_id: UserId,
    pub amount: Amount,
    pub reversed: bool,
    pub created_at: TimeMs,
}
