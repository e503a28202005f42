//! The ledger store: the single mutation primitive for all money movement.

use crate::db::Repository;
use crate::domain::{Account, Amount, EntryKind, EntryStatus, LedgerEntry, TimeMs, UserId};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::locks::AccountLocks;
use super::LedgerError;

/// Bounded retry budget for version conflicts before surfacing Contention.
const CAS_RETRY_LIMIT: u32 = 3;

/// A request to apply one ledger entry.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub user_id: UserId,
    pub kind: EntryKind,
    /// Signed amount: negative for debit kinds, positive for credit kinds.
    pub amount: Amount,
    pub reference_id: String,
    pub idempotency_key: String,
}

/// Result of applying an entry: the (possibly pre-existing) entry, the
/// account balance after it, and whether this call actually applied it.
#[derive(Debug, Clone)]
pub struct AppliedEntry {
    pub entry: LedgerEntry,
    pub balance: Amount,
    /// False when the idempotency key matched an existing entry.
    pub applied: bool,
}

/// Append-only ledger with a cached per-account balance.
///
/// Serializes mutations per account via [`AccountLocks`] and additionally
/// guards the balance write with a version compare-and-swap, so even an
/// out-of-process writer cannot make two debits pass a sufficiency check
/// that only one should pass.
pub struct LedgerStore {
    repo: Arc<Repository>,
    locks: AccountLocks,
}

impl LedgerStore {
    pub fn new(repo: Arc<Repository>) -> Self {
        LedgerStore {
            repo,
            locks: AccountLocks::new(),
        }
    }

    /// Open a new account with a zero balance.
    ///
    /// Referral attribution is immutable once set here; an existing account
    /// is returned unchanged regardless of the presented referrer.
    ///
    /// # Errors
    /// Returns an error if storage fails.
    pub async fn open_account(
        &self,
        user_id: &UserId,
        referred_by: Option<String>,
    ) -> Result<Account, LedgerError> {
        let _guard = self.locks.acquire(user_id).await;

        if let Some(existing) = self.repo.get_account(user_id).await? {
            return Ok(existing);
        }

        let account = Account {
            user_id: user_id.clone(),
            balance: Amount::zero(),
            version: 0,
            referred_by,
            created_at: TimeMs::now(),
        };
        self.repo.insert_account(&account).await?;
        info!(user = %user_id, "opened account");
        Ok(account)
    }

    /// Fetch an account, failing if it does not exist.
    ///
    /// # Errors
    /// Returns `AccountNotFound` for unregistered users.
    pub async fn require_account(&self, user_id: &UserId) -> Result<Account, LedgerError> {
        self.repo
            .get_account(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))
    }

    /// Apply one ledger entry atomically: the sole de-duplication and
    /// balance-mutation mechanism for all money movement in the system.
    ///
    /// If an entry with the same idempotency key already exists with an
    /// identical payload, it is returned unchanged (`applied = false`). The
    /// same key with a different payload is a caller bug or an attack and
    /// fails with `DuplicateKeyConflict`.
    ///
    /// # Errors
    /// `InvalidAmount` for zero amounts, wrong sign for the kind, or
    /// excessive precision; `InsufficientFunds` (carrying the unchanged
    /// balance) when a debit would drive the balance negative;
    /// `Contention` after the bounded version-conflict retry budget.
    pub async fn apply_entry(&self, request: EntryRequest) -> Result<AppliedEntry, LedgerError> {
        validate_amount(request.kind, request.amount)?;

        let _guard = self.locks.acquire(&request.user_id).await;

        if let Some(existing) = self.repo.find_entry_by_key(&request.idempotency_key).await? {
            if !payload_matches(&existing, &request) {
                warn!(
                    key = %request.idempotency_key,
                    "idempotency key reused with different payload"
                );
                return Err(LedgerError::DuplicateKeyConflict);
            }
            let account = self.require_account(&request.user_id).await?;
            return Ok(AppliedEntry {
                entry: existing,
                balance: account.balance,
                applied: false,
            });
        }

        for attempt in 0..CAS_RETRY_LIMIT {
            let account = self.require_account(&request.user_id).await?;
            let new_balance = account.balance + request.amount;

            if new_balance.is_negative() {
                return Err(LedgerError::InsufficientFunds {
                    balance: account.balance,
                });
            }

            let entry = LedgerEntry {
                entry_id: Uuid::new_v4().to_string(),
                user_id: request.user_id.clone(),
                kind: request.kind,
                amount: request.amount,
                reference_id: request.reference_id.clone(),
                idempotency_key: request.idempotency_key.clone(),
                status: EntryStatus::Settled,
                created_at: TimeMs::now(),
            };

            if self
                .repo
                .insert_entry_with_balance(&entry, new_balance, account.version)
                .await?
            {
                info!(
                    user = %request.user_id,
                    kind = %request.kind,
                    amount = %request.amount,
                    reference = %request.reference_id,
                    "applied ledger entry"
                );
                return Ok(AppliedEntry {
                    entry,
                    balance: new_balance,
                    applied: true,
                });
            }

            warn!(
                user = %request.user_id,
                attempt,
                "stale version conflict applying ledger entry, retrying"
            );
        }

        Err(LedgerError::Contention)
    }

    /// Recompute the balance as a fold over the settled ledger and compare
    /// it to the cached balance.
    ///
    /// # Errors
    /// Returns `AccountNotFound` for unregistered users.
    pub async fn audit_account(
        &self,
        user_id: &UserId,
    ) -> Result<AccountAudit, LedgerError> {
        let account = self.require_account(user_id).await?;
        let derived = self.repo.sum_settled_entries(user_id).await?;
        Ok(AccountAudit {
            cached_balance: account.balance,
            derived_balance: derived,
            consistent: account.balance == derived,
        })
    }
}

/// Result of reconciling an account's cached balance against the ledger fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountAudit {
    pub cached_balance: Amount,
    pub derived_balance: Amount,
    pub consistent: bool,
}

fn payload_matches(existing: &LedgerEntry, request: &EntryRequest) -> bool {
    existing.user_id == request.user_id
        && existing.kind == request.kind
        && existing.amount == request.amount
        && existing.reference_id == request.reference_id
}

fn validate_amount(kind: EntryKind, amount: Amount) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount("amount must be non-zero".into()));
    }
    if !amount.is_money_scale() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount {} exceeds {} decimal places",
            amount,
            crate::domain::MONEY_SCALE
        )));
    }
    if kind.is_debit() && !amount.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "{} entries must carry a negative amount",
            kind
        )));
    }
    if !kind.is_debit() && !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "{} entries must carry a positive amount",
            kind
        )));
    }
    Ok(())
}
