//! Game settlement engine: join, score updates, end, void, reconciliation.

use crate::db::Repository;
use crate::domain::{Amount, EntryKind, GameSession, SessionStatus, TimeMs, UserId};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::commission::CommissionEngine;
use super::ledger::{EntryRequest, LedgerStore};
use super::payout::PayoutSchedule;
use super::LedgerError;

/// Outcome of settling (or replaying the settlement of) a session.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub session_id: String,
    pub payout: Amount,
    pub balance: Amount,
    /// True when this call returned a previously computed result.
    pub replayed: bool,
}

/// Outcome of joining a game.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: GameSession,
    pub balance: Amount,
}

/// Outcome of voiding a session.
#[derive(Debug, Clone)]
pub struct VoidOutcome {
    pub session_id: String,
    pub refunded: Amount,
    pub balance: Amount,
    /// True when the session was already void and nothing changed.
    pub replayed: bool,
}

/// Pot conservation report for one match.
#[derive(Debug, Clone)]
pub struct MatchReconciliation {
    pub match_id: String,
    pub sessions: usize,
    pub open_sessions: usize,
    /// Sum of bets across non-void sessions.
    pub pot: Amount,
    /// Sum of payout credits across ended sessions.
    pub payouts: Amount,
    /// Sum of refunded bets across void sessions.
    pub refunds: Amount,
    /// True when every session is closed and payouts equal the pot.
    pub balanced: bool,
}

/// Computes payout at game end and applies it via the ledger store.
///
/// Cross-account settlement is deliberately per-account: each player's bet
/// and payout is an independent ledger transaction, and pot conservation is
/// verified by [`SettlementEngine::reconcile_match`] rather than enforced
/// as one cross-account transaction.
pub struct SettlementEngine {
    ledger: Arc<LedgerStore>,
    commission: Arc<CommissionEngine>,
    repo: Arc<Repository>,
    schedule: PayoutSchedule,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        commission: Arc<CommissionEngine>,
        repo: Arc<Repository>,
        schedule: PayoutSchedule,
    ) -> Self {
        SettlementEngine {
            ledger,
            commission,
            repo,
            schedule,
        }
    }

    /// Join a game: debit the bet and create an active session.
    ///
    /// On `InsufficientFunds` the join is rejected and no session exists.
    /// A successful bet accrues affiliate commission for referred users.
    ///
    /// # Errors
    /// Propagates ledger validation and storage errors.
    pub async fn join(
        &self,
        user_id: &UserId,
        bet_amount: Amount,
        game_type: &str,
        match_id: Option<String>,
    ) -> Result<JoinOutcome, LedgerError> {
        if !bet_amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "bet amount must be positive".into(),
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        let bet_key = format!("bet:{}", session_id);

        let applied = self
            .ledger
            .apply_entry(EntryRequest {
                user_id: user_id.clone(),
                kind: EntryKind::Bet,
                amount: -bet_amount,
                reference_id: session_id.clone(),
                idempotency_key: bet_key.clone(),
            })
            .await?;

        let session = GameSession {
            session_id: session_id.clone(),
            user_id: user_id.clone(),
            match_id,
            game_type: game_type.to_string(),
            bet_amount,
            status: SessionStatus::Active,
            last_score: None,
            final_score: None,
            final_rank: None,
            payout: None,
            created_at: TimeMs::now(),
            ended_at: None,
        };
        self.repo.insert_session(&session).await?;

        self.commission
            .accrue_on_bet(user_id, bet_amount, &bet_key)
            .await?;

        info!(user = %user_id, session = %session_id, bet = %bet_amount, "joined game");
        Ok(JoinOutcome {
            session,
            balance: applied.balance,
        })
    }

    /// Record an informational score update. Never ledger-affecting.
    ///
    /// # Errors
    /// `SessionNotFound` when the session is missing or no longer active.
    pub async fn score_update(&self, session_id: &str, score: i64) -> Result<(), LedgerError> {
        if self.repo.update_session_score(session_id, score).await? {
            Ok(())
        } else {
            Err(LedgerError::SessionNotFound(session_id.to_string()))
        }
    }

    /// End a session: compute the payout from the pot snapshot and credit it.
    ///
    /// The guarded close claims the session before any money moves, so a
    /// concurrent `end` or `void` resolves to exactly one outcome. Calling
    /// `end` on an already-ended session returns the stored payout; the
    /// payout credit is keyed by the session id so a retried call can
    /// never double-pay.
    ///
    /// # Errors
    /// `SessionNotFound` for unknown sessions, `SessionVoid` when the
    /// session was voided, `InvalidAmount` for a malformed pot or rank.
    pub async fn end(
        &self,
        session_id: &str,
        final_score: i64,
        final_rank: i64,
        pot: Amount,
    ) -> Result<SettlementOutcome, LedgerError> {
        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;

        match session.status {
            SessionStatus::Void => return Err(LedgerError::SessionVoid),
            SessionStatus::Ended => return self.replay_end(&session).await,
            SessionStatus::Active => {}
        }

        if final_rank < 1 {
            return Err(LedgerError::InvalidAmount("final rank must be >= 1".into()));
        }
        if pot.is_negative() || !pot.is_money_scale() {
            return Err(LedgerError::InvalidAmount(format!("invalid pot: {}", pot)));
        }

        // Ranks past u32::MAX are far beyond any paid rank; never truncate.
        let payout = match u32::try_from(final_rank) {
            Ok(rank) => self.schedule.payout(pot, rank),
            Err(_) => Amount::zero(),
        };

        if !self
            .repo
            .close_session(session_id, final_score, final_rank, payout, TimeMs::now())
            .await?
        {
            // Lost the transition race; follow the winner's outcome.
            let current = self
                .repo
                .get_session(session_id)
                .await?
                .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
            return match current.status {
                SessionStatus::Void => Err(LedgerError::SessionVoid),
                SessionStatus::Ended => self.replay_end(&current).await,
                SessionStatus::Active => Err(LedgerError::Contention),
            };
        }

        let balance = self
            .apply_payout(&session.user_id, session_id, payout)
            .await?;

        info!(
            session = %session_id,
            rank = final_rank,
            pot = %pot,
            payout = %payout,
            "settled game session"
        );
        Ok(SettlementOutcome {
            session_id: session_id.to_string(),
            payout,
            balance,
            replayed: false,
        })
    }

    /// Replay path for an already-ended session. Re-applies the keyed
    /// payout entry so a crash between the close and the credit heals on
    /// the next delivery.
    async fn replay_end(&self, session: &GameSession) -> Result<SettlementOutcome, LedgerError> {
        let payout = session.payout.unwrap_or_else(Amount::zero);
        let balance = self
            .apply_payout(&session.user_id, &session.session_id, payout)
            .await?;
        Ok(SettlementOutcome {
            session_id: session.session_id.clone(),
            payout,
            balance,
            replayed: true,
        })
    }

    async fn apply_payout(
        &self,
        user_id: &UserId,
        session_id: &str,
        payout: Amount,
    ) -> Result<Amount, LedgerError> {
        if payout.is_positive() {
            Ok(self
                .ledger
                .apply_entry(EntryRequest {
                    user_id: user_id.clone(),
                    kind: EntryKind::Payout,
                    amount: payout,
                    reference_id: session_id.to_string(),
                    idempotency_key: format!("payout:{}", session_id),
                })
                .await?
                .balance)
        } else {
            Ok(self.ledger.require_account(user_id).await?.balance)
        }
    }

    /// Void an active session: refund the bet and reverse any commission
    /// accrual. Idempotent; a second void changes nothing. The guarded
    /// transition claims the session before the refund, so a `void` racing
    /// an `end` resolves to exactly one outcome.
    ///
    /// # Errors
    /// `SessionNotFound` for unknown sessions, `SessionAlreadyEnded` when
    /// the session already settled (void is only legal from active).
    pub async fn void(&self, session_id: &str) -> Result<VoidOutcome, LedgerError> {
        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;

        match session.status {
            SessionStatus::Ended => return Err(LedgerError::SessionAlreadyEnded),
            SessionStatus::Void => return self.replay_void(&session).await,
            SessionStatus::Active => {}
        }

        if !self.repo.void_session(session_id, TimeMs::now()).await? {
            // Lost the transition race; follow the winner's outcome.
            let current = self
                .repo
                .get_session(session_id)
                .await?
                .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
            return match current.status {
                SessionStatus::Ended => Err(LedgerError::SessionAlreadyEnded),
                SessionStatus::Void => self.replay_void(&current).await,
                SessionStatus::Active => Err(LedgerError::Contention),
            };
        }

        let balance = self.apply_void_refund(&session).await?;

        info!(session = %session_id, refunded = %session.bet_amount, "voided game session");
        Ok(VoidOutcome {
            session_id: session_id.to_string(),
            refunded: session.bet_amount,
            balance,
            replayed: false,
        })
    }

    /// Replay path for an already-void session. Re-applies the keyed
    /// refund entry and the commission reversal, both idempotent, so a
    /// crash mid-void heals on the next delivery.
    async fn replay_void(&self, session: &GameSession) -> Result<VoidOutcome, LedgerError> {
        let balance = self.apply_void_refund(session).await?;
        Ok(VoidOutcome {
            session_id: session.session_id.clone(),
            refunded: session.bet_amount,
            balance,
            replayed: true,
        })
    }

    async fn apply_void_refund(&self, session: &GameSession) -> Result<Amount, LedgerError> {
        let applied = self
            .ledger
            .apply_entry(EntryRequest {
                user_id: session.user_id.clone(),
                kind: EntryKind::Refund,
                amount: session.bet_amount,
                reference_id: session.session_id.clone(),
                idempotency_key: format!("refund:{}", session.session_id),
            })
            .await?;

        self.commission
            .reverse_for_bet(&format!("bet:{}", session.session_id))
            .await?;

        Ok(applied.balance)
    }

    /// Verify pot conservation for a match: the sum of bet debits across
    /// participants must equal the sum of payout credits once every
    /// session has closed.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn reconcile_match(
        &self,
        match_id: &str,
    ) -> Result<MatchReconciliation, LedgerError> {
        let sessions = self.repo.query_sessions_by_match(match_id).await?;

        let mut pot = Amount::zero();
        let mut payouts = Amount::zero();
        let mut refunds = Amount::zero();
        let mut open = 0usize;

        for session in &sessions {
            match session.status {
                // Active sessions still hold their bet in the pot.
                SessionStatus::Active => {
                    open += 1;
                    pot = pot + session.bet_amount;
                }
                SessionStatus::Ended => {
                    pot = pot + session.bet_amount;
                    payouts = payouts + session.payout.unwrap_or_else(Amount::zero);
                }
                SessionStatus::Void => refunds = refunds + session.bet_amount,
            }
        }

        Ok(MatchReconciliation {
            match_id: match_id.to_string(),
            sessions: sessions.len(),
            open_sessions: open,
            pot,
            payouts,
            refunds,
            balanced: open == 0 && pot == payouts,
        })
    }

    /// List sessions still active past the staleness bound, for the
    /// external reconciliation sweep to void.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn stale_sessions(
        &self,
        older_than_ms: i64,
    ) -> Result<Vec<GameSession>, LedgerError> {
        let cutoff = TimeMs::new(TimeMs::now().as_ms() - older_than_ms);
        Ok(self.repo.query_stale_sessions(cutoff).await?)
    }
}
