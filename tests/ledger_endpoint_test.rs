use axum::http::StatusCode;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use wagercore::api;
use wagercore::config::Config;
use wagercore::db::init_db;
use wagercore::domain::Amount;
use wagercore::engine::{
    CommissionEngine, LedgerStore, PayoutSchedule, SettlementEngine, WithdrawalPolicy,
    WithdrawalProcessor,
};
use wagercore::Repository;

fn test_config(db_path: String) -> Config {
    Config {
        port: 0,
        database_path: db_path,
        min_bet: Amount::from_str("0.001").unwrap(),
        max_bet: Amount::from_str("50").unwrap(),
        majority_share: Amount::from_str("0.7").unwrap(),
        paid_ranks: 3,
        withdrawal_fee: Amount::from_str("0.0005").unwrap(),
        min_withdrawal: Amount::from_str("0.01").unwrap(),
        max_withdrawal: Amount::from_str("100").unwrap(),
        max_daily_withdrawal: Amount::from_str("100").unwrap(),
        default_commission_rate: Amount::from_str("0.05").unwrap(),
        signer_url: None,
        allowed_game_types: vec!["skill_match".to_string(), "tournament".to_string()],
    }
}

async fn setup_test_app() -> (axum::Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let config = test_config(db_path);

    let ledger = Arc::new(LedgerStore::new(repo.clone()));
    let commission = Arc::new(CommissionEngine::new(
        ledger.clone(),
        repo.clone(),
        config.default_commission_rate,
    ));
    let settlement = Arc::new(SettlementEngine::new(
        ledger.clone(),
        commission.clone(),
        repo.clone(),
        PayoutSchedule {
            majority_share: config.majority_share,
            paid_ranks: config.paid_ranks,
        },
    ));
    let withdrawals = Arc::new(WithdrawalProcessor::new(
        ledger.clone(),
        repo.clone(),
        None,
        WithdrawalPolicy {
            fee: config.withdrawal_fee,
            min_amount: config.min_withdrawal,
            max_amount: config.max_withdrawal,
            max_daily: config.max_daily_withdrawal,
        },
    ));

    let state = api::AppState::new(repo, config, ledger, settlement, withdrawals, commission);
    let app = api::create_router(state);
    (app, temp_dir)
}

async fn post(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_register_creates_account_with_zero_balance() {
    let (app, _temp) = setup_test_app().await;

    let (status, body) = post(
        app,
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], "alice");
    assert_eq!(body["balance"], "0");
    assert_eq!(body["created"], true);
    assert_eq!(body["referralCode"].as_str().unwrap().len(), 8);
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let (app, _temp) = setup_test_app().await;

    let (_s, first) = post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;
    let (status, second) = post(
        app,
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(second["referralCode"], first["referralCode"]);
}

#[tokio::test]
async fn test_register_rejects_empty_user_id() {
    let (app, _temp) = setup_test_app().await;

    let (status, _body) = post(
        app,
        "/v1/users/register",
        serde_json::json!({"userId": "  "}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deposit_credits_balance() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    let (status, body) = post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "100", "txHash": "0xaaa"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "100");
    assert_eq!(body["applied"], true);

    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "100");
    assert_eq!(balance["pendingWithdrawals"], "0");
}

#[tokio::test]
async fn test_deposit_records_chain_metadata() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    let (status, body) = post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({
            "userId": "alice",
            "amount": "100",
            "txHash": "0xaaa",
            "blockNumber": 123456,
            "tokenType": "USDC",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blockNumber"], 123456);
    assert_eq!(body["tokenType"], "USDC");

    // Metadata is optional; the token type falls back to the default.
    let (status, body) = post(
        app,
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "5", "txHash": "0xbbb"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("blockNumber").is_none());
    assert_eq!(body["tokenType"], "SOL");
}

#[tokio::test]
async fn test_deposit_redelivery_credits_once() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    let deposit = serde_json::json!({"userId": "alice", "amount": "100", "txHash": "0xaaa"});
    post(app.clone(), "/v1/deposits", deposit.clone()).await;
    let (status, body) = post(app.clone(), "/v1/deposits", deposit).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "100");
    assert_eq!(body["applied"], false);
}

#[tokio::test]
async fn test_deposit_same_tx_hash_different_amount_conflicts() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "100", "txHash": "0xaaa"}),
    )
    .await;
    let (status, _body) = post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "999", "txHash": "0xaaa"}),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);

    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "100");
}

#[tokio::test]
async fn test_deposit_to_unknown_user_is_not_found() {
    let (app, _temp) = setup_test_app().await;

    let (status, _body) = post(
        app,
        "/v1/deposits",
        serde_json::json!({"userId": "ghost", "amount": "100", "txHash": "0xaaa"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deposit_rejects_invalid_amount() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;

    let (status, _body) = post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "abc", "txHash": "0xaaa"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // More decimal places than money precision allows.
    let (status, _body) = post(
        app,
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "1.0000001", "txHash": "0xbbb"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ledger_history_newest_first() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;
    post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "100", "txHash": "0xaaa"}),
    )
    .await;
    post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "50", "txHash": "0xbbb"}),
    )
    .await;

    let (status, body) = get(app, "/v1/users/alice/ledger").await;
    assert_eq!(status, StatusCode::OK);

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "deposit");
    assert!(entries[0]["createdAt"].as_str().unwrap().ends_with('Z'));
    let amounts: Vec<&str> = entries
        .iter()
        .map(|e| e["amount"].as_str().unwrap())
        .collect();
    assert!(amounts.contains(&"100"));
    assert!(amounts.contains(&"50"));
}

#[tokio::test]
async fn test_ledger_history_respects_limit() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;
    for i in 0..5 {
        post(
            app.clone(),
            "/v1/deposits",
            serde_json::json!({"userId": "alice", "amount": "1", "txHash": format!("0x{}", i)}),
        )
        .await;
    }

    let (_s, body) = get(app, "/v1/users/alice/ledger?limit=3").await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_balance_for_unknown_user_is_not_found() {
    let (app, _temp) = setup_test_app().await;

    let (status, _body) = get(app, "/v1/users/ghost/balance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_reports_consistent_account() {
    let (app, _temp) = setup_test_app().await;

    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": "alice"}),
    )
    .await;
    post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": "alice", "amount": "100", "txHash": "0xaaa"}),
    )
    .await;

    let (status, body) = get(app, "/v1/users/alice/audit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cachedBalance"], "100");
    assert_eq!(body["derivedBalance"], "100");
    assert_eq!(body["consistent"], true);
    assert_eq!(body["drift"], "0");
}

#[tokio::test]
async fn test_health_and_ready() {
    let (app, _temp) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
