//! Ledger entry operations for the repository.

use crate::domain::{Amount, Deposit, EntryKind, EntryStatus, LedgerEntry, TimeMs, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_amount, Repository};

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    let kind_str = row.get::<String, _>("kind");
    let kind = EntryKind::parse(&kind_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown entry kind: {}", kind_str).into()))?;
    let status_str = row.get::<String, _>("status");
    let status = EntryStatus::parse(&status_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown entry status: {}", status_str).into())
    })?;

    Ok(LedgerEntry {
        entry_id: row.get::<String, _>("entry_id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        kind,
        amount: parse_amount(&row.get::<String, _>("amount"))?,
        reference_id: row.get::<String, _>("reference_id"),
        idempotency_key: row.get::<String, _>("idempotency_key"),
        status,
        created_at: TimeMs::new(row.get::<i64, _>("created_at")),
    })
}

impl Repository {
    /// Look up a ledger entry by its idempotency key.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_entry_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT entry_id, user_id, kind, amount, reference_id,
                   idempotency_key, status, created_at
            FROM ledger_entries
            WHERE idempotency_key = ?
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Insert a ledger entry and update the cached account balance in one
    /// transaction, guarded by a compare-and-swap on the account version.
    ///
    /// Returns `false` (and commits nothing) when the version check misses,
    /// meaning another writer got there first and the caller must retry.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_entry_with_balance(
        &self,
        entry: &LedgerEntry,
        new_balance: Amount,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?, version = version + 1
            WHERE user_id = ? AND version = ?
            "#,
        )
        .bind(new_balance.to_canonical_string())
        .bind(entry.user_id.as_str())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                entry_id, user_id, kind, amount, reference_id,
                idempotency_key, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.entry_id)
        .bind(entry.user_id.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.amount.to_canonical_string())
        .bind(&entry.reference_id)
        .bind(&entry.idempotency_key)
        .bind(entry.status.as_str())
        .bind(entry.created_at.as_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Query ledger entries for a user, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_entries(
        &self,
        user: &UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, user_id, kind, amount, reference_id,
                   idempotency_key, status, created_at
            FROM ledger_entries
            WHERE user_id = ?
            ORDER BY created_at DESC, entry_id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Record the chain metadata for a confirmed deposit. Keyed by the
    /// transaction hash so redelivered webhooks write at most once.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO deposits (
                tx_hash, user_id, amount, block_number, token_type, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash) DO NOTHING
            "#,
        )
        .bind(&deposit.tx_hash)
        .bind(deposit.user_id.as_str())
        .bind(deposit.amount.to_canonical_string())
        .bind(deposit.block_number)
        .bind(&deposit.token_type)
        .bind(deposit.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch the chain metadata for a deposit.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_deposit(&self, tx_hash: &str) -> Result<Option<Deposit>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT tx_hash, user_id, amount, block_number, token_type, created_at
            FROM deposits
            WHERE tx_hash = ?
            "#,
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Deposit {
                tx_hash: row.get::<String, _>("tx_hash"),
                user_id: UserId::new(row.get::<String, _>("user_id")),
                amount: parse_amount(&row.get::<String, _>("amount"))?,
                block_number: row.get::<Option<i64>, _>("block_number"),
                token_type: row.get::<String, _>("token_type"),
                created_at: TimeMs::new(row.get::<i64, _>("created_at")),
            })
        })
        .transpose()
    }

    /// Fold the settled ledger entries for a user into a balance.
    ///
    /// Amounts are stored as canonical strings, so the fold happens in Rust
    /// rather than SQL to stay lossless.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_settled_entries(&self, user: &UserId) -> Result<Amount, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT amount
            FROM ledger_entries
            WHERE user_id = ? AND status = 'settled'
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut total = Amount::zero();
        for row in &rows {
            total = total + parse_amount(&row.get::<String, _>("amount"))?;
        }
        Ok(total)
    }
}
