use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::LedgerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            AppError::Ledger(err) => ledger_response(err),
        };

        (status, Json(body)).into_response()
    }
}

/// Rejections carry enough context that the client never needs a follow-up
/// balance query; an insufficient-funds response includes the balance.
fn ledger_response(err: LedgerError) -> (StatusCode, serde_json::Value) {
    match &err {
        LedgerError::InsufficientFunds { balance } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": err.to_string(),
                "balance": balance.to_canonical_string(),
            }),
        ),
        LedgerError::InsufficientPendingCommission { available } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": err.to_string(),
                "pendingCommission": available.to_canonical_string(),
            }),
        ),
        LedgerError::DuplicateKeyConflict => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        LedgerError::InvalidAmount(_) | LedgerError::InvalidAddress(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        LedgerError::AccountNotFound(_)
        | LedgerError::SessionNotFound(_)
        | LedgerError::WithdrawalNotFound(_) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        LedgerError::SessionAlreadyEnded | LedgerError::SessionVoid => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        LedgerError::WithdrawalLimitExceeded => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": err.to_string() }),
        ),
        LedgerError::Contention => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": err.to_string() }),
        ),
        LedgerError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use std::str::FromStr;

    #[test]
    fn test_insufficient_funds_carries_balance() {
        let (status, body) = ledger_response(LedgerError::InsufficientFunds {
            balance: Amount::from_str("12.5").unwrap(),
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["balance"], "12.5");
    }

    #[test]
    fn test_not_found_status() {
        let (status, _) = ledger_response(LedgerError::SessionNotFound("s1".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_key_is_conflict() {
        let (status, _) = ledger_response(LedgerError::DuplicateKeyConflict);
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
