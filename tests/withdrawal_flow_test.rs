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

const DEST: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

async fn setup_test_app(max_daily: &str) -> (axum::Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        min_bet: Amount::from_str("0.001").unwrap(),
        max_bet: Amount::from_str("50").unwrap(),
        majority_share: Amount::from_str("0.7").unwrap(),
        paid_ranks: 3,
        withdrawal_fee: Amount::from_str("0.0005").unwrap(),
        min_withdrawal: Amount::from_str("0.01").unwrap(),
        max_withdrawal: Amount::from_str("100").unwrap(),
        max_daily_withdrawal: Amount::from_str(max_daily).unwrap(),
        default_commission_rate: Amount::from_str("0.05").unwrap(),
        signer_url: None,
        allowed_game_types: vec!["skill_match".to_string()],
    };

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

async fn register_and_fund(app: &axum::Router, user: &str, amount: &str) {
    post(
        app.clone(),
        "/v1/users/register",
        serde_json::json!({"userId": user}),
    )
    .await;
    post(
        app.clone(),
        "/v1/deposits",
        serde_json::json!({"userId": user, "amount": amount, "txHash": format!("0xfund:{}", user)}),
    )
    .await;
}

fn withdraw_body(user: &str, amount: &str) -> serde_json::Value {
    serde_json::json!({
        "userId": user,
        "amount": amount,
        "destinationAddress": DEST,
    })
}

#[tokio::test]
async fn test_withdrawal_reserves_amount_plus_fee() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (status, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], "10");
    assert_eq!(body["fee"], "0.0005");

    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "89.9995");
    assert_eq!(balance["pendingWithdrawals"], "10.0005");
}

#[tokio::test]
async fn test_withdrawal_lifecycle_broadcasting_then_completed() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (_s, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    let (status, body) = post(
        app.clone(),
        &format!("/v1/withdrawals/{}/broadcasting", id),
        serde_json::json!({"transactionHash": "0xtx1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "broadcasting");
    assert_eq!(body["transactionHash"], "0xtx1");

    let (status, body) = post(
        app.clone(),
        &format!("/v1/withdrawals/{}/completed", id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    // The reserved funds stay gone and no longer count as pending.
    let (_s, balance) = get(app.clone(), "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "89.9995");
    assert_eq!(balance["pendingWithdrawals"], "0");

    let (_s, fetched) = get(app, &format!("/v1/withdrawals/{}", id)).await;
    assert_eq!(fetched["status"], "completed");
}

#[tokio::test]
async fn test_completed_accepted_directly_from_pending() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (_s, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    // Completion can outrun the broadcasting signal.
    let (status, body) = post(
        app.clone(),
        &format!("/v1/withdrawals/{}/completed", id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    // A late broadcasting signal no longer changes the state.
    let (status, body) = post(
        app,
        &format!("/v1/withdrawals/{}/broadcasting", id),
        serde_json::json!({"transactionHash": "0xlate"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_failed_withdrawal_refunds_exactly_once() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (_s, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    let (status, body) = post(
        app.clone(),
        &format!("/v1/withdrawals/{}/failed", id),
        serde_json::json!({"reason": "broadcast rejected"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failureReason"], "broadcast rejected");

    let (_s, balance) = get(app.clone(), "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "100");

    // Redelivered failure signal refunds nothing further.
    post(
        app.clone(),
        &format!("/v1/withdrawals/{}/failed", id),
        serde_json::json!({"reason": "broadcast rejected"}),
    )
    .await;
    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "100");
}

#[tokio::test]
async fn test_concurrent_completion_and_failure_resolve_to_one_outcome() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (_s, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    let completed_path = format!("/v1/withdrawals/{}/completed", id);
    let failed_path = format!("/v1/withdrawals/{}/failed", id);
    tokio::join!(
        post(app.clone(), &completed_path, serde_json::json!({})),
        post(
            app.clone(),
            &failed_path,
            serde_json::json!({"reason": "node error"}),
        ),
    );

    // Whichever signal wins, the terminal state and the balance must agree:
    // completed keeps the debit, failed refunds it. Never both.
    let (_s, fetched) = get(app.clone(), &format!("/v1/withdrawals/{}", id)).await;
    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    match fetched["status"].as_str().unwrap() {
        "completed" => assert_eq!(balance["balance"], "89.9995"),
        "failed" => assert_eq!(balance["balance"], "100"),
        other => panic!("unexpected terminal status: {}", other),
    }
}

#[tokio::test]
async fn test_failure_signal_after_completion_is_ignored() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (_s, body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    post(
        app.clone(),
        &format!("/v1/withdrawals/{}/completed", id),
        serde_json::json!({}),
    )
    .await;
    let (status, body) = post(
        app.clone(),
        &format!("/v1/withdrawals/{}/failed", id),
        serde_json::json!({"reason": "late"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "89.9995");
}

#[tokio::test]
async fn test_withdrawal_rejects_bad_address() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    let (status, _body) = post(
        app,
        "/v1/withdrawals",
        serde_json::json!({
            "userId": "alice",
            "amount": "10",
            "destinationAddress": "not-an-address",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_withdrawal_rejects_amount_outside_bounds() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "500").await;

    let (status, _body) =
        post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "0.001")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _body) = post(app, "/v1/withdrawals", withdraw_body("alice", "101")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_daily_withdrawal_limit() {
    let (app, _temp) = setup_test_app("15").await;
    register_and_fund(&app, "alice", "100").await;

    let (status, _body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _body) = post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "10")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // The rejected request debited nothing.
    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "89.9995");
}

#[tokio::test]
async fn test_unknown_withdrawal_is_not_found() {
    let (app, _temp) = setup_test_app("1000").await;

    let (status, _body) = get(app.clone(), "/v1/withdrawals/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _body) = post(
        app,
        "/v1/withdrawals/nope/completed",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_withdrawals_cannot_overdraw() {
    let (app, _temp) = setup_test_app("1000").await;
    register_and_fund(&app, "alice", "100").await;

    // Two racing 60.00 withdrawals against a 100 balance: exactly one wins.
    let (first, second) = tokio::join!(
        post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "60")),
        post(app.clone(), "/v1/withdrawals", withdraw_body("alice", "60")),
    );

    let statuses = [first.0, second.0];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::UNPROCESSABLE_ENTITY));

    let rejected = if first.0 == StatusCode::OK { second.1 } else { first.1 };
    assert_eq!(rejected["balance"], "39.9995");

    let (_s, balance) = get(app, "/v1/users/alice/balance").await;
    assert_eq!(balance["balance"], "39.9995");
}
