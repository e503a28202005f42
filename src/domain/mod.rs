//! Domain model for the ledger and settlement core.

pub mod affiliate;
pub mod amount;
pub mod ledger;
pub mod primitives;
pub mod session;
pub mod withdrawal;

pub use affiliate::{Affiliate, CommissionAccrual};
pub use amount::{Amount, MONEY_SCALE};
pub use ledger::{Account, Deposit, EntryKind, EntryStatus, LedgerEntry};
pub use primitives::{TimeMs, UserId};
pub use session::{GameSession, SessionStatus};
pub use withdrawal::{Withdrawal, WithdrawalStatus};
