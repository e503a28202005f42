use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Amount, Deposit, EntryKind, TimeMs, UserId};
use crate::engine::EntryRequest;
use crate::error::AppError;

const DEFAULT_TOKEN_TYPE: &str = "SOL";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub user_id: String,
    pub amount: String,
    pub tx_hash: String,
    pub block_number: Option<i64>,
    pub token_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub user_id: String,
    pub balance: String,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    pub token_type: String,
    /// False when this transaction hash was already credited.
    pub applied: bool,
}

/// Deposit confirmation webhook. Keyed by the on-chain transaction hash, so
/// a redelivered confirmation credits at most once. Block number and token
/// type are recorded as chain metadata alongside the ledger entry.
pub async fn record_deposit(
    State(state): State<AppState>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    if payload.tx_hash.trim().is_empty() {
        return Err(AppError::BadRequest("txHash must not be empty".into()));
    }
    let amount = Amount::from_str_canonical(&payload.amount)
        .map_err(|_| AppError::BadRequest("Invalid deposit amount".into()))?;
    let user_id = UserId::new(payload.user_id);
    let token_type = payload
        .token_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

    let applied = state
        .ledger
        .apply_entry(EntryRequest {
            user_id: user_id.clone(),
            kind: EntryKind::Deposit,
            amount,
            reference_id: payload.tx_hash.clone(),
            idempotency_key: payload.tx_hash.clone(),
        })
        .await?;

    state
        .repo
        .insert_deposit(&Deposit {
            tx_hash: payload.tx_hash.clone(),
            user_id: user_id.clone(),
            amount,
            block_number: payload.block_number,
            token_type: token_type.clone(),
            created_at: TimeMs::now(),
        })
        .await?;

    Ok(Json(DepositResponse {
        user_id: user_id.to_string(),
        balance: applied.balance.to_canonical_string(),
        tx_hash: payload.tx_hash,
        block_number: payload.block_number,
        token_type,
        applied: applied.applied,
    }))
}
