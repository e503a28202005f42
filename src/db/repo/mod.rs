//! Repository layer for database operations.
//!
//! One `impl Repository` block per aggregate lives in the submodules:
//! ledger entries, game sessions, withdrawals, and affiliates. Account
//! operations live here.

mod affiliates;
mod ledger;
mod sessions;
mod withdrawals;

use crate::domain::{Account, Amount, TimeMs, UserId};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

/// Decode a canonical decimal string column into an Amount.
fn parse_amount(s: &str) -> Result<Amount, sqlx::Error> {
    Amount::from_str_canonical(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn account_from_row(row: &SqliteRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        user_id: UserId::new(row.get::<String, _>("user_id")),
        balance: parse_amount(&row.get::<String, _>("balance"))?,
        version: row.get::<i64, _>("version"),
        referred_by: row.get::<Option<String>, _>("referred_by"),
        created_at: TimeMs::new(row.get::<i64, _>("created_at")),
    })
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Insert a new account. Fails if the user already has one.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_account(&self, account: &Account) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, balance, version, referred_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.user_id.as_str())
        .bind(account.balance.to_canonical_string())
        .bind(account.version)
        .bind(account.referred_by.as_deref())
        .bind(account.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch an account by user id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_account(&self, user: &UserId) -> Result<Option<Account>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, balance, version, referred_by, created_at
            FROM accounts
            WHERE user_id = ?
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    /// Count accounts referred by the given affiliate.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_referrals(&self, affiliate_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE referred_by = ?")
            .bind(affiliate_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
