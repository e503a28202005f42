use std::net::SocketAddr;
use std::sync::Arc;
use wagercore::engine::{
    CommissionEngine, LedgerStore, PayoutSchedule, SettlementEngine, WithdrawalPolicy,
    WithdrawalProcessor,
};
use wagercore::signer::{HttpSigner, Signer};
use wagercore::{api, config::Config, db::init_db, Repository};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
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

    let signer: Option<Arc<dyn Signer>> = config
        .signer_url
        .clone()
        .map(|url| Arc::new(HttpSigner::new(url)) as Arc<dyn Signer>);
    let withdrawals = Arc::new(WithdrawalProcessor::new(
        ledger.clone(),
        repo.clone(),
        signer,
        WithdrawalPolicy {
            fee: config.withdrawal_fee,
            min_amount: config.min_withdrawal,
            max_amount: config.max_withdrawal,
            max_daily: config.max_daily_withdrawal,
        },
    ));

    // Create router
    let app = api::create_router(api::AppState::new(
        repo,
        config,
        ledger,
        settlement,
        withdrawals,
        commission,
    ));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
