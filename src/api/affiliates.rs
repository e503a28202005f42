use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::withdrawals::{withdrawal_dto, WithdrawalDto};
use crate::api::AppState;
use crate::domain::{Amount, UserId};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateStatsResponse {
    pub user_id: String,
    pub referral_code: String,
    pub commission_rate: String,
    pub pending_commission: String,
    pub total_commission: String,
    pub referral_count: i64,
}

pub async fn get_stats(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AffiliateStatsResponse>, AppError> {
    let user_id = UserId::new(user_id);
    let stats = state.commission.stats(&user_id).await?;

    Ok(Json(AffiliateStatsResponse {
        user_id: stats.affiliate.user_id.to_string(),
        referral_code: stats.affiliate.referral_code,
        commission_rate: stats.affiliate.commission_rate.to_canonical_string(),
        pending_commission: stats.affiliate.pending_commission.to_canonical_string(),
        total_commission: stats.affiliate.total_commission.to_canonical_string(),
        referral_count: stats.referral_count,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionWithdrawRequest {
    pub amount: String,
    pub destination_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionWithdrawResponse {
    pub commission_withdrawn: String,
    pub pending_commission: String,
    pub withdrawal: WithdrawalDto,
}

pub async fn withdraw(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<CommissionWithdrawRequest>,
) -> Result<Json<CommissionWithdrawResponse>, AppError> {
    let amount = Amount::from_str_canonical(&payload.amount)
        .map_err(|_| AppError::BadRequest("Invalid commission amount".into()))?;
    let user_id = UserId::new(user_id);

    let outcome = state
        .commission
        .withdraw_commission(
            &state.withdrawals,
            &user_id,
            amount,
            &payload.destination_address,
        )
        .await?;

    Ok(Json(CommissionWithdrawResponse {
        commission_withdrawn: outcome.commission_withdrawn.to_canonical_string(),
        pending_commission: outcome.pending_commission.to_canonical_string(),
        withdrawal: withdrawal_dto(outcome.withdrawal),
    }))
}
