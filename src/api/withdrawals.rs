use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Amount, UserId, Withdrawal};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub user_id: String,
    pub amount: String,
    pub destination_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDto {
    pub withdrawal_id: String,
    pub user_id: String,
    pub amount: String,
    pub fee: String,
    pub destination_address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub fn withdrawal_dto(w: Withdrawal) -> WithdrawalDto {
    WithdrawalDto {
        withdrawal_id: w.withdrawal_id,
        user_id: w.user_id.to_string(),
        amount: w.amount.to_canonical_string(),
        fee: w.fee.to_canonical_string(),
        destination_address: w.destination_address,
        status: w.status.as_str().to_string(),
        transaction_hash: w.transaction_hash,
        failure_reason: w.failure_reason,
        created_at: w.created_at.to_iso8601(),
        updated_at: w.updated_at.to_iso8601(),
    }
}

pub async fn request(
    State(state): State<AppState>,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let amount = Amount::from_str_canonical(&payload.amount)
        .map_err(|_| AppError::BadRequest("Invalid withdrawal amount".into()))?;
    let user_id = UserId::new(payload.user_id);

    let withdrawal = state
        .withdrawals
        .clone()
        .request(&user_id, amount, &payload.destination_address)
        .await?;

    Ok(Json(withdrawal_dto(withdrawal)))
}

pub async fn get(
    Path(withdrawal_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let withdrawal = state.withdrawals.get(&withdrawal_id).await?;
    Ok(Json(withdrawal_dto(withdrawal)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastingRequest {
    pub transaction_hash: String,
}

/// Signer callback: the transaction was broadcast.
pub async fn broadcasting(
    Path(withdrawal_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<BroadcastingRequest>,
) -> Result<Json<WithdrawalDto>, AppError> {
    if payload.transaction_hash.trim().is_empty() {
        return Err(AppError::BadRequest(
            "transactionHash must not be empty".into(),
        ));
    }
    let withdrawal = state
        .withdrawals
        .mark_broadcasting(&withdrawal_id, &payload.transaction_hash)
        .await?;
    Ok(Json(withdrawal_dto(withdrawal)))
}

/// Signer callback: the transaction confirmed on-chain.
pub async fn completed(
    Path(withdrawal_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let withdrawal = state.withdrawals.mark_completed(&withdrawal_id).await?;
    Ok(Json(withdrawal_dto(withdrawal)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRequest {
    pub reason: Option<String>,
}

/// Signer callback: the transaction failed; the debit is refunded.
pub async fn failed(
    Path(withdrawal_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<FailedRequest>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let reason = payload.reason.as_deref().unwrap_or("unspecified");
    let withdrawal = state.withdrawals.mark_failed(&withdrawal_id, reason).await?;
    Ok(Json(withdrawal_dto(withdrawal)))
}
