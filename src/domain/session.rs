//! Game session domain types.

use super::{Amount, TimeMs, UserId};

/// Lifecycle of a game session.
///
/// `active -> ended` on normal completion, `active -> void` when the game is
/// cancelled or abandoned before a result (the bet is refunded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Active,
    Ended,
    Void,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "ended" => Some(SessionStatus::Ended),
            "void" => Some(SessionStatus::Void),
            _ => None,
        }
    }
}

/// One session per joined player. The bet is debited at join time; payout
/// (or a refund on void) is credited when the session closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub session_id: String,
    pub user_id: UserId,
    /// Groups the sessions of one multi-player game for pot reconciliation.
    pub match_id: Option<String>,
    pub game_type: String,
    pub bet_amount: Amount,
    pub status: SessionStatus,
    /// Last informational score reported by the game server. Never ledger-affecting.
    pub last_score: Option<i64>,
    pub final_score: Option<i64>,
    pub final_rank: Option<i64>,
    /// Computed once at end time from the pot snapshot; never recalculated.
    pub payout: Option<Amount>,
    pub created_at: TimeMs,
    pub ended_at: Option<TimeMs>,
}
