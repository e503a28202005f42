pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod signer;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Account, Affiliate, Amount, Deposit, EntryKind, EntryStatus, GameSession, LedgerEntry,
    SessionStatus, TimeMs, UserId, Withdrawal, WithdrawalStatus,
};
pub use engine::{
    CommissionEngine, LedgerError, LedgerStore, PayoutSchedule, SettlementEngine,
    WithdrawalPolicy, WithdrawalProcessor,
};
pub use error::AppError;
pub use signer::{HttpSigner, MockSigner, Signer};
