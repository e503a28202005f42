use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Amount, GameSession, UserId};
use crate::error::AppError;

/// Sessions active longer than this are considered stale by default.
const DEFAULT_STALE_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: String,
    pub bet_amount: String,
    pub game_type: String,
    pub match_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub session_id: String,
    pub user_id: String,
    pub bet_amount: String,
    pub game_type: String,
    pub balance: String,
}

pub async fn join(
    State(state): State<AppState>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    if !state
        .config
        .allowed_game_types
        .iter()
        .any(|t| t == &payload.game_type)
    {
        return Err(AppError::BadRequest(format!(
            "Unknown game type: {}",
            payload.game_type
        )));
    }

    let bet_amount = Amount::from_str_canonical(&payload.bet_amount)
        .map_err(|_| AppError::BadRequest("Invalid bet amount".into()))?;
    if bet_amount < state.config.min_bet {
        return Err(AppError::BadRequest(format!(
            "Minimum bet is {}",
            state.config.min_bet
        )));
    }
    if bet_amount > state.config.max_bet {
        return Err(AppError::BadRequest(format!(
            "Maximum bet is {}",
            state.config.max_bet
        )));
    }

    let user_id = UserId::new(payload.user_id);
    let outcome = state
        .settlement
        .join(&user_id, bet_amount, &payload.game_type, payload.match_id)
        .await?;

    Ok(Json(JoinResponse {
        session_id: outcome.session.session_id,
        user_id: user_id.to_string(),
        bet_amount: outcome.session.bet_amount.to_canonical_string(),
        game_type: outcome.session.game_type,
        balance: outcome.balance.to_canonical_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    pub session_id: String,
    pub score: i64,
}

pub async fn score(
    State(state): State<AppState>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .settlement
        .score_update(&payload.session_id, payload.score)
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub session_id: String,
    pub final_score: i64,
    pub final_rank: i64,
    pub pot: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResponse {
    pub session_id: String,
    pub payout: String,
    pub balance: String,
    pub replayed: bool,
}

pub async fn end(
    State(state): State<AppState>,
    Json(payload): Json<EndRequest>,
) -> Result<Json<EndResponse>, AppError> {
    let pot = Amount::from_str_canonical(&payload.pot)
        .map_err(|_| AppError::BadRequest("Invalid pot amount".into()))?;

    let outcome = state
        .settlement
        .end(
            &payload.session_id,
            payload.final_score,
            payload.final_rank,
            pot,
        )
        .await?;

    Ok(Json(EndResponse {
        session_id: outcome.session_id,
        payout: outcome.payout.to_canonical_string(),
        balance: outcome.balance.to_canonical_string(),
        replayed: outcome.replayed,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidResponse {
    pub session_id: String,
    pub refunded: String,
    pub balance: String,
    pub replayed: bool,
}

pub async fn void(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<VoidResponse>, AppError> {
    let outcome = state.settlement.void(&session_id).await?;

    Ok(Json(VoidResponse {
        session_id: outcome.session_id,
        refunded: outcome.refunded.to_canonical_string(),
        balance: outcome.balance.to_canonical_string(),
        replayed: outcome.replayed,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub match_id: String,
    pub sessions: usize,
    pub open_sessions: usize,
    pub pot: String,
    pub payouts: String,
    pub refunds: String,
    pub balanced: bool,
}

pub async fn reconcile(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let report = state.settlement.reconcile_match(&match_id).await?;

    Ok(Json(ReconcileResponse {
        match_id: report.match_id,
        sessions: report.sessions,
        open_sessions: report.open_sessions,
        pot: report.pot.to_canonical_string(),
        payouts: report.payouts.to_canonical_string(),
        refunds: report.refunds.to_canonical_string(),
        balanced: report.balanced,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleQuery {
    pub older_than_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleResponse {
    pub sessions: Vec<StaleSessionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleSessionDto {
    pub session_id: String,
    pub user_id: String,
    pub game_type: String,
    pub bet_amount: String,
    pub created_at: String,
}

pub async fn stale_sessions(
    Query(params): Query<StaleQuery>,
    State(state): State<AppState>,
) -> Result<Json<StaleResponse>, AppError> {
    let older_than = params.older_than_ms.unwrap_or(DEFAULT_STALE_MS);
    if older_than < 0 {
        return Err(AppError::BadRequest("olderThanMs must be >= 0".into()));
    }

    let sessions = state.settlement.stale_sessions(older_than).await?;
    Ok(Json(StaleResponse {
        sessions: sessions.iter().map(stale_dto).collect(),
    }))
}

fn stale_dto(session: &GameSession) -> StaleSessionDto {
    StaleSessionDto {
        session_id: session.session_id.clone(),
        user_id: session.user_id.to_string(),
        game_type: session.game_type.clone(),
        bet_amount: session.bet_amount.to_canonical_string(),
        created_at: session.created_at.to_iso8601(),
    }
}
