use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Amount, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_id: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    pub balance: String,
    pub referral_code: String,
    pub created: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("userId must not be empty".into()));
    }
    let user_id = UserId::new(payload.user_id);

    let registration = state
        .commission
        .register(&user_id, payload.referral_code.as_deref())
        .await?;

    Ok(Json(RegisterResponse {
        user_id: registration.account.user_id.to_string(),
        balance: registration.account.balance.to_canonical_string(),
        referral_code: registration.affiliate.referral_code,
        created: registration.created,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: String,
    /// Funds reserved by withdrawals not yet settled on-chain (amount + fee).
    pub pending_withdrawals: String,
}

pub async fn get_balance(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    let user_id = UserId::new(user_id);
    let account = state.ledger.require_account(&user_id).await?;
    let pending = state.repo.pending_withdrawal_total(&user_id).await?;

    Ok(Json(BalanceResponse {
        user_id: account.user_id.to_string(),
        balance: account.balance.to_canonical_string(),
        pending_withdrawals: pending.to_canonical_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub user_id: String,
    pub entries: Vec<LedgerEntryDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryDto {
    pub entry_id: String,
    pub kind: String,
    pub amount: String,
    pub reference_id: String,
    pub status: String,
    pub created_at: String,
}

pub async fn get_ledger(
    Path(user_id): Path<String>,
    Query(params): Query<LedgerQuery>,
    State(state): State<AppState>,
) -> Result<Json<LedgerResponse>, AppError> {
    let user_id = UserId::new(user_id);
    state.ledger.require_account(&user_id).await?;

    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    let entries = state.repo.query_entries(&user_id, limit, offset).await?;
    let entries = entries
        .into_iter()
        .map(|e| LedgerEntryDto {
            entry_id: e.entry_id,
            kind: e.kind.as_str().to_string(),
            amount: e.amount.to_canonical_string(),
            reference_id: e.reference_id,
            status: e.status.as_str().to_string(),
            created_at: e.created_at.to_iso8601(),
        })
        .collect();

    Ok(Json(LedgerResponse {
        user_id: user_id.to_string(),
        entries,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub user_id: String,
    pub cached_balance: String,
    pub derived_balance: String,
    pub consistent: bool,
    pub drift: String,
}

pub async fn get_audit(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AuditResponse>, AppError> {
    let user_id = UserId::new(user_id);
    let audit = state.ledger.audit_account(&user_id).await?;
    let drift: Amount = audit.cached_balance - audit.derived_balance;

    Ok(Json(AuditResponse {
        user_id: user_id.to_string(),
        cached_balance: audit.cached_balance.to_canonical_string(),
        derived_balance: audit.derived_balance.to_canonical_string(),
        consistent: audit.consistent,
        drift: drift.to_canonical_string(),
    }))
}
