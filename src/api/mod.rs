pub mod affiliates;
pub mod deposits;
pub mod games;
pub mod health;
pub mod users;
pub mod withdrawals;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::{CommissionEngine, LedgerStore, SettlementEngine, WithdrawalProcessor};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ledger: Arc<LedgerStore>,
    pub settlement: Arc<SettlementEngine>,
    pub withdrawals: Arc<WithdrawalProcessor>,
    pub commission: Arc<CommissionEngine>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        ledger: Arc<LedgerStore>,
        settlement: Arc<SettlementEngine>,
        withdrawals: Arc<WithdrawalProcessor>,
        commission: Arc<CommissionEngine>,
    ) -> Self {
        Self {
            repo,
            config,
            ledger,
            settlement,
            withdrawals,
            commission,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/users/register", post(users::register))
        .route("/v1/users/:user_id/balance", get(users::get_balance))
        .route("/v1/users/:user_id/ledger", get(users::get_ledger))
        .route("/v1/users/:user_id/audit", get(users::get_audit))
        .route("/v1/deposits", post(deposits::record_deposit))
        .route("/v1/games/join", post(games::join))
        .route("/v1/games/score", post(games::score))
        .route("/v1/games/end", post(games::end))
        .route("/v1/games/:session_id/void", post(games::void))
        .route("/v1/matches/:match_id/reconcile", get(games::reconcile))
        .route("/v1/sessions/stale", get(games::stale_sessions))
        .route("/v1/withdrawals", post(withdrawals::request))
        .route("/v1/withdrawals/:withdrawal_id", get(withdrawals::get))
        .route(
            "/v1/withdrawals/:withdrawal_id/broadcasting",
            post(withdrawals::broadcasting),
        )
        .route(
            "/v1/withdrawals/:withdrawal_id/completed",
            post(withdrawals::completed),
        )
        .route(
            "/v1/withdrawals/:withdrawal_id/failed",
            post(withdrawals::failed),
        )
        .route("/v1/affiliates/:user_id", get(affiliates::get_stats))
        .route(
            "/v1/affiliates/:user_id/withdraw",
            post(affiliates::withdraw),
        )
        .layer(cors)
        .with_state(state)
}
