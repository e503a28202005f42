//! Affiliate commission engine: registration, accrual, and commission
//! withdrawal, built on the same ledger primitive as everything else.

use crate::db::Repository;
use crate::domain::{
    Account, Affiliate, Amount, CommissionAccrual, EntryKind, TimeMs, UserId,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::ledger::{EntryRequest, LedgerStore};
use super::withdrawal::WithdrawalProcessor;
use super::LedgerError;

/// Retry budget for commission balance compare-and-swap misses.
const CAS_RETRY_LIMIT: u32 = 3;

/// Affiliate stats exposed at the boundary.
#[derive(Debug, Clone)]
pub struct AffiliateStats {
    pub affiliate: Affiliate,
    pub referral_count: i64,
}

/// Result of registering a user.
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub affiliate: Affiliate,
    /// False when the user was already registered.
    pub created: bool,
}

pub struct CommissionEngine {
    ledger: Arc<LedgerStore>,
    repo: Arc<Repository>,
    default_rate: Amount,
}

impl CommissionEngine {
    pub fn new(ledger: Arc<LedgerStore>, repo: Arc<Repository>, default_rate: Amount) -> Self {
        CommissionEngine {
            ledger,
            repo,
            default_rate,
        }
    }

    /// Register a user: open the account and create its affiliate record.
    ///
    /// Referral attribution is resolved from the presented code and set
    /// once at creation; it never changes afterwards, which prevents
    /// commission-routing manipulation after the fact. An unknown code is
    /// ignored with a warning rather than failing registration.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn register(
        &self,
        user_id: &UserId,
        referral_code: Option<&str>,
    ) -> Result<Registration, LedgerError> {
        if let Some(account) = self.repo.get_account(user_id).await? {
            let affiliate = self
                .repo
                .get_affiliate_by_user(user_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))?;
            return Ok(Registration {
                account,
                affiliate,
                created: false,
            });
        }

        let referred_by = match referral_code {
            Some(code) => match self.repo.get_affiliate_by_code(code).await? {
                Some(referrer) if referrer.user_id != *user_id => Some(referrer.affiliate_id),
                Some(_) => {
                    warn!(user = %user_id, "user presented their own referral code");
                    None
                }
                None => {
                    warn!(user = %user_id, code, "unknown referral code ignored");
                    None
                }
            },
            None => None,
        };

        let account = self.ledger.open_account(user_id, referred_by).await?;
        let affiliate = self.create_affiliate(user_id).await?;

        info!(user = %user_id, code = %affiliate.referral_code, "registered user");
        Ok(Registration {
            account,
            affiliate,
            created: true,
        })
    }

    async fn create_affiliate(&self, user_id: &UserId) -> Result<Affiliate, LedgerError> {
        // Referral codes are unique; retry on the unlikely collision.
        for _ in 0..CAS_RETRY_LIMIT {
            let affiliate = Affiliate {
                affiliate_id: Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                referral_code: generate_referral_code(),
                commission_rate: self.default_rate,
                pending_commission: Amount::zero(),
                total_commission: Amount::zero(),
                created_at: TimeMs::now(),
            };
            match self.repo.insert_affiliate(&affiliate).await {
                Ok(()) => return Ok(affiliate),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    warn!(user = %user_id, "referral code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    /// Accrue commission for a settled bet by a referred user.
    ///
    /// The accrual is keyed by the bet's idempotency key, so a replayed
    /// bet accrues exactly once. Commission accrues in the affiliate
    /// record, not as a ledger entry, until explicitly withdrawn. The
    /// pending balance bump happens inside the repo's write transaction,
    /// so concurrent bets by different referred users never lose accruals.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn accrue_on_bet(
        &self,
        user_id: &UserId,
        bet_amount: Amount,
        bet_key: &str,
    ) -> Result<Option<Amount>, LedgerError> {
        let account = self.ledger.require_account(user_id).await?;
        let Some(affiliate_id) = account.referred_by else {
            return Ok(None);
        };
        let Some(affiliate) = self.repo.get_affiliate(&affiliate_id).await? else {
            warn!(user = %user_id, affiliate = %affiliate_id, "referrer affiliate missing");
            return Ok(None);
        };

        let commission = (bet_amount * affiliate.commission_rate).round_money();
        if !commission.is_positive() {
            return Ok(None);
        }

        let accrual = CommissionAccrual {
            bet_key: bet_key.to_string(),
            affiliate_id: affiliate.affiliate_id.clone(),
            referred_user_id: user_id.clone(),
            amount: commission,
            reversed: false,
            created_at: TimeMs::now(),
        };
        if self.repo.insert_accrual(&accrual).await? {
            info!(
                affiliate = %affiliate.affiliate_id,
                referred = %user_id,
                commission = %commission,
                "accrued commission"
            );
            Ok(Some(commission))
        } else {
            Ok(None)
        }
    }

    /// Reverse the accrual for a voided bet, as if the bet never happened.
    ///
    /// Idempotent: an already-reversed accrual (or a bet that never
    /// accrued) changes nothing. The pending balance clamps at zero in
    /// case the commission was already withdrawn.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn reverse_for_bet(&self, bet_key: &str) -> Result<Option<Amount>, LedgerError> {
        let Some(accrual) = self.repo.get_accrual(bet_key).await? else {
            return Ok(None);
        };
        if accrual.reversed {
            return Ok(None);
        }

        if self
            .repo
            .reverse_accrual(bet_key, &accrual.affiliate_id, accrual.amount)
            .await?
        {
            info!(
                affiliate = %accrual.affiliate_id,
                bet_key,
                amount = %accrual.amount,
                "reversed commission accrual"
            );
            Ok(Some(accrual.amount))
        } else {
            Ok(None)
        }
    }

    /// Withdraw accrued commission: move it from pending to total, credit
    /// it to the balance as a `commission` ledger entry, then route it
    /// through the withdrawal processor exactly like a normal withdrawal.
    ///
    /// The on-chain amount is `amount - fee`, so the withdrawal debit
    /// equals the commission credit and the flow is balance-neutral.
    ///
    /// # Errors
    /// `InsufficientPendingCommission` when `amount` exceeds the accrued
    /// pending commission; address and bound violations surface before any
    /// state changes.
    pub async fn withdraw_commission(
        &self,
        processor: &Arc<WithdrawalProcessor>,
        user_id: &UserId,
        amount: Amount,
        destination_address: &str,
    ) -> Result<CommissionWithdrawal, LedgerError> {
        let fee = processor.fee();
        let net = amount - fee;
        // Validate the downstream withdrawal up front so nothing is
        // decremented for a request that cannot be queued.
        processor.validate_request(user_id, net, destination_address).await?;

        for _ in 0..CAS_RETRY_LIMIT {
            let affiliate = self
                .repo
                .get_affiliate_by_user(user_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))?;

            if amount > affiliate.pending_commission {
                return Err(LedgerError::InsufficientPendingCommission {
                    available: affiliate.pending_commission,
                });
            }

            let new_pending = affiliate.pending_commission - amount;
            let new_total = affiliate.total_commission + amount;
            if !self
                .repo
                .cas_commission_balances(
                    &affiliate.affiliate_id,
                    affiliate.pending_commission,
                    new_pending,
                    new_total,
                )
                .await?
            {
                warn!(affiliate = %affiliate.affiliate_id, "commission balance contention, retrying");
                continue;
            }

            let withdrawal_id = Uuid::new_v4().to_string();
            self.ledger
                .apply_entry(EntryRequest {
                    user_id: user_id.clone(),
                    kind: EntryKind::Commission,
                    amount,
                    reference_id: withdrawal_id.clone(),
                    idempotency_key: format!("commission:{}", withdrawal_id),
                })
                .await?;

            let withdrawal = Arc::clone(processor)
                .request_with_id(&withdrawal_id, user_id, net, destination_address)
                .await?;

            info!(
                user = %user_id,
                amount = %amount,
                withdrawal = %withdrawal.withdrawal_id,
                "commission withdrawal queued"
            );
            return Ok(CommissionWithdrawal {
                withdrawal,
                commission_withdrawn: amount,
                pending_commission: new_pending,
            });
        }

        Err(LedgerError::Contention)
    }

    /// Affiliate stats for the boundary.
    ///
    /// # Errors
    /// `AccountNotFound` when the user has no affiliate record.
    pub async fn stats(&self, user_id: &UserId) -> Result<AffiliateStats, LedgerError> {
        let affiliate = self
            .repo
            .get_affiliate_by_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))?;
        let referral_count = self.repo.count_referrals(&affiliate.affiliate_id).await?;
        Ok(AffiliateStats {
            affiliate,
            referral_count,
        })
    }
}

/// Result of a commission withdrawal.
#[derive(Debug, Clone)]
pub struct CommissionWithdrawal {
    pub withdrawal: crate::domain::Withdrawal,
    pub commission_withdrawn: Amount,
    pub pending_commission: Amount,
}

fn generate_referral_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}
