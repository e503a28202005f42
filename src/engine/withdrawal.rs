//! Withdrawal processor: validates and queues outbound transfers and tracks
//! their external completion state.

use crate::db::Repository;
use crate::domain::{
    Amount, EntryKind, TimeMs, UserId, Withdrawal, WithdrawalStatus,
};
use crate::signer::Signer;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ledger::{EntryRequest, LedgerStore};
use super::LedgerError;

/// Rolling window for the daily withdrawal limit.
const DAILY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Bounds and fee policy for withdrawals.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawalPolicy {
    pub fee: Amount,
    pub min_amount: Amount,
    pub max_amount: Amount,
    pub max_daily: Amount,
}

pub struct WithdrawalProcessor {
    ledger: Arc<LedgerStore>,
    repo: Arc<Repository>,
    signer: Option<Arc<dyn Signer>>,
    policy: WithdrawalPolicy,
}

impl WithdrawalProcessor {
    pub fn new(
        ledger: Arc<LedgerStore>,
        repo: Arc<Repository>,
        signer: Option<Arc<dyn Signer>>,
        policy: WithdrawalPolicy,
    ) -> Self {
        WithdrawalProcessor {
            ledger,
            repo,
            signer,
            policy,
        }
    }

    /// The flat fee charged per withdrawal.
    pub fn fee(&self) -> Amount {
        self.policy.fee
    }

    /// Validate a prospective withdrawal without changing any state.
    ///
    /// # Errors
    /// `InvalidAddress`, `InvalidAmount` for bound or precision violations,
    /// `WithdrawalLimitExceeded` against the rolling daily limit.
    pub async fn validate_request(
        &self,
        user_id: &UserId,
        amount: Amount,
        destination_address: &str,
    ) -> Result<(), LedgerError> {
        validate_address(destination_address)?;

        if !amount.is_positive() || !amount.is_money_scale() {
            return Err(LedgerError::InvalidAmount(format!(
                "invalid withdrawal amount: {}",
                amount
            )));
        }
        if amount < self.policy.min_amount {
            return Err(LedgerError::InvalidAmount(format!(
                "minimum withdrawal amount is {}",
                self.policy.min_amount
            )));
        }
        if amount > self.policy.max_amount {
            return Err(LedgerError::InvalidAmount(format!(
                "maximum withdrawal amount is {}",
                self.policy.max_amount
            )));
        }

        let since = TimeMs::new(TimeMs::now().as_ms() - DAILY_WINDOW_MS);
        let recent = self.repo.sum_withdrawals_since(user_id, since).await?;
        if recent + amount > self.policy.max_daily {
            return Err(LedgerError::WithdrawalLimitExceeded);
        }

        Ok(())
    }

    /// Request a withdrawal: validate, reserve the funds, queue for the
    /// signer.
    ///
    /// Funds (amount + fee) are debited immediately even though on-chain
    /// settlement is asynchronous, so a second request racing the first
    /// cannot overcommit the balance.
    ///
    /// # Errors
    /// Validation errors as in [`Self::validate_request`], plus
    /// `InsufficientFunds` carrying the unchanged balance.
    pub async fn request(
        self: Arc<Self>,
        user_id: &UserId,
        amount: Amount,
        destination_address: &str,
    ) -> Result<Withdrawal, LedgerError> {
        let withdrawal_id = Uuid::new_v4().to_string();
        self.request_with_id(&withdrawal_id, user_id, amount, destination_address)
            .await
    }

    /// Request a withdrawal under a caller-supplied id (the commission
    /// engine links its ledger credit to the same id).
    ///
    /// # Errors
    /// As [`Self::request`].
    pub async fn request_with_id(
        self: Arc<Self>,
        withdrawal_id: &str,
        user_id: &UserId,
        amount: Amount,
        destination_address: &str,
    ) -> Result<Withdrawal, LedgerError> {
        self.validate_request(user_id, amount, destination_address)
            .await?;

        let total = amount + self.policy.fee;
        self.ledger
            .apply_entry(EntryRequest {
                user_id: user_id.clone(),
                kind: EntryKind::Withdrawal,
                amount: -total,
                reference_id: withdrawal_id.to_string(),
                idempotency_key: withdrawal_id.to_string(),
            })
            .await?;

        let now = TimeMs::now();
        let withdrawal = Withdrawal {
            withdrawal_id: withdrawal_id.to_string(),
            user_id: user_id.clone(),
            amount,
            fee: self.policy.fee,
            destination_address: destination_address.to_string(),
            status: WithdrawalStatus::Pending,
            transaction_hash: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_withdrawal(&withdrawal).await?;

        info!(
            user = %user_id,
            withdrawal = %withdrawal_id,
            amount = %amount,
            fee = %self.policy.fee,
            "withdrawal requested"
        );

        if self.signer.is_some() {
            let processor = Arc::clone(&self);
            let queued = withdrawal.clone();
            tokio::spawn(async move { processor.dispatch(queued).await });
        }

        Ok(withdrawal)
    }

    /// Submit a queued withdrawal to the signer and record the outcome.
    ///
    /// The signer retries transient failures internally; a permanent
    /// failure moves the withdrawal to `failed`, which refunds the funds.
    async fn dispatch(&self, withdrawal: Withdrawal) {
        let Some(signer) = self.signer.as_ref() else {
            return;
        };

        match signer.submit(&withdrawal).await {
            Ok(tx_hash) => {
                if let Err(e) = self
                    .mark_broadcasting(&withdrawal.withdrawal_id, &tx_hash)
                    .await
                {
                    error!(withdrawal = %withdrawal.withdrawal_id, error = %e, "failed to record broadcast");
                }
            }
            Err(e) => {
                warn!(withdrawal = %withdrawal.withdrawal_id, error = %e, "signer rejected withdrawal");
                if let Err(e) = self
                    .mark_failed(&withdrawal.withdrawal_id, &e.to_string())
                    .await
                {
                    error!(withdrawal = %withdrawal.withdrawal_id, error = %e, "failed to record signer failure");
                }
            }
        }
    }

    /// Fetch a withdrawal.
    ///
    /// # Errors
    /// `WithdrawalNotFound` for unknown ids.
    pub async fn get(&self, withdrawal_id: &str) -> Result<Withdrawal, LedgerError> {
        self.repo
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound(withdrawal_id.to_string()))
    }

    /// Record that the signer broadcast the transaction.
    ///
    /// Idempotent against redelivery; a signal arriving after a terminal
    /// status is logged and ignored.
    ///
    /// # Errors
    /// `WithdrawalNotFound` for unknown ids.
    pub async fn mark_broadcasting(
        &self,
        withdrawal_id: &str,
        tx_hash: &str,
    ) -> Result<Withdrawal, LedgerError> {
        if !self
            .repo
            .set_withdrawal_broadcasting(withdrawal_id, tx_hash, TimeMs::now())
            .await?
        {
            let current = self.get(withdrawal_id).await?;
            if current.status != WithdrawalStatus::Broadcasting {
                warn!(
                    withdrawal = %withdrawal_id,
                    status = current.status.as_str(),
                    "ignoring broadcasting signal in status"
                );
            }
            return Ok(current);
        }

        info!(withdrawal = %withdrawal_id, tx_hash, "withdrawal broadcasting");
        self.get(withdrawal_id).await
    }

    /// Record external completion. Idempotent; completion may arrive
    /// before the broadcasting signal and is accepted from `pending` too.
    ///
    /// # Errors
    /// `WithdrawalNotFound` for unknown ids.
    pub async fn mark_completed(&self, withdrawal_id: &str) -> Result<Withdrawal, LedgerError> {
        if !self
            .repo
            .set_withdrawal_completed(withdrawal_id, TimeMs::now())
            .await?
        {
            let current = self.get(withdrawal_id).await?;
            if current.status != WithdrawalStatus::Completed {
                warn!(
                    withdrawal = %withdrawal_id,
                    status = current.status.as_str(),
                    "ignoring completion signal in terminal status"
                );
            }
            return Ok(current);
        }

        info!(withdrawal = %withdrawal_id, "withdrawal completed");
        self.get(withdrawal_id).await
    }

    /// Record external failure and refund the reserved funds.
    ///
    /// The guarded transition claims the withdrawal before the refund, so
    /// a `completed` signal racing into the window can never leave the
    /// withdrawal both completed and refunded. The compensating `refund`
    /// entry is keyed by `{withdrawal_id}:refund` and re-applied on
    /// redelivered failure signals, so a crash between the transition and
    /// the refund heals on the next delivery and funds are returned
    /// exactly once.
    ///
    /// # Errors
    /// `WithdrawalNotFound` for unknown ids.
    pub async fn mark_failed(
        &self,
        withdrawal_id: &str,
        reason: &str,
    ) -> Result<Withdrawal, LedgerError> {
        let withdrawal = self.get(withdrawal_id).await?;

        if withdrawal.status.is_terminal() {
            if withdrawal.status == WithdrawalStatus::Completed {
                warn!(
                    withdrawal = %withdrawal_id,
                    "ignoring failure signal for completed withdrawal"
                );
            } else {
                // Already failed: re-apply the keyed refund to heal a
                // crash between the transition and the refund.
                self.apply_refund(&withdrawal).await?;
            }
            return Ok(withdrawal);
        }

        if !self
            .repo
            .set_withdrawal_failed(withdrawal_id, reason, TimeMs::now())
            .await?
        {
            // Lost the transition race; follow the winner's outcome.
            let current = self.get(withdrawal_id).await?;
            if current.status == WithdrawalStatus::Failed {
                self.apply_refund(&current).await?;
            } else {
                warn!(
                    withdrawal = %withdrawal_id,
                    status = current.status.as_str(),
                    "ignoring failure signal in status"
                );
            }
            return Ok(current);
        }

        self.apply_refund(&withdrawal).await?;

        info!(
            withdrawal = %withdrawal_id,
            refunded = %withdrawal.total_debit(),
            reason,
            "withdrawal failed, funds refunded"
        );
        self.get(withdrawal_id).await
    }

    async fn apply_refund(&self, withdrawal: &Withdrawal) -> Result<(), LedgerError> {
        self.ledger
            .apply_entry(EntryRequest {
                user_id: withdrawal.user_id.clone(),
                kind: EntryKind::Refund,
                amount: withdrawal.total_debit(),
                reference_id: withdrawal.withdrawal_id.clone(),
                idempotency_key: format!("{}:refund", withdrawal.withdrawal_id),
            })
            .await?;
        Ok(())
    }
}

/// Accepts EVM-style addresses (0x + 40 hex chars) and base58 addresses of
/// 32-44 chars, matching the wallet formats the platform supports.
fn validate_address(address: &str) -> Result<(), LedgerError> {
    if let Some(hex_part) = address.strip_prefix("0x") {
        if hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(());
        }
    } else if (32..=44).contains(&address.len()) && address.chars().all(is_base58_char) {
        return Ok(());
    }
    Err(LedgerError::InvalidAddress(address.to_string()))
}

fn is_base58_char(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}
