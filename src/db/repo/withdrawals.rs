//! Withdrawal operations for the repository.

use crate::domain::{Amount, TimeMs, UserId, Withdrawal, WithdrawalStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_amount, Repository};

const WITHDRAWAL_COLUMNS: &str = "withdrawal_id, user_id, amount, fee, destination_address, \
     status, transaction_hash, failure_reason, created_at, updated_at";

fn withdrawal_from_row(row: &SqliteRow) -> Result<Withdrawal, sqlx::Error> {
    let status_str = row.get::<String, _>("status");
    let status = WithdrawalStatus::parse(&status_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown withdrawal status: {}", status_str).into())
    })?;

    Ok(Withdrawal {
        withdrawal_id: row.get::<String, _>("withdrawal_id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        amount: parse_amount(&row.get::<String, _>("amount"))?,
        fee: parse_amount(&row.get::<String, _>("fee"))?,
        destination_address: row.get::<String, _>("destination_address"),
        status,
        transaction_hash: row.get::<Option<String>, _>("transaction_hash"),
        failure_reason: row.get::<Option<String>, _>("failure_reason"),
        created_at: TimeMs::new(row.get::<i64, _>("created_at")),
        updated_at: TimeMs::new(row.get::<i64, _>("updated_at")),
    })
}

impl Repository {
    /// Insert a new withdrawal.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (
                withdrawal_id, user_id, amount, fee, destination_address,
                status, transaction_hash, failure_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&withdrawal.withdrawal_id)
        .bind(withdrawal.user_id.as_str())
        .bind(withdrawal.amount.to_canonical_string())
        .bind(withdrawal.fee.to_canonical_string())
        .bind(&withdrawal.destination_address)
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.transaction_hash.as_deref())
        .bind(withdrawal.failure_reason.as_deref())
        .bind(withdrawal.created_at.as_ms())
        .bind(withdrawal.updated_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a withdrawal by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_withdrawal(
        &self,
        withdrawal_id: &str,
    ) -> Result<Option<Withdrawal>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE withdrawal_id = ?",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(withdrawal_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(withdrawal_from_row).transpose()
    }

    /// Transition a withdrawal to `broadcasting` with its transaction hash.
    ///
    /// Guarded on `pending` so redelivered signals are no-ops. Returns
    /// `false` when no transition happened.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_withdrawal_broadcasting(
        &self,
        withdrawal_id: &str,
        tx_hash: &str,
        updated_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals
            SET status = 'broadcasting', transaction_hash = ?, updated_at = ?
            WHERE withdrawal_id = ? AND status = 'pending'
            "#,
        )
        .bind(tx_hash)
        .bind(updated_at.as_ms())
        .bind(withdrawal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a withdrawal to `completed` from any non-terminal status.
    ///
    /// Completion may arrive before the broadcasting signal, so `pending`
    /// is also accepted. Returns `false` when no transition happened.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_withdrawal_completed(
        &self,
        withdrawal_id: &str,
        updated_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals
            SET status = 'completed', updated_at = ?
            WHERE withdrawal_id = ? AND status IN ('pending', 'broadcasting')
            "#,
        )
        .bind(updated_at.as_ms())
        .bind(withdrawal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a withdrawal to `failed` from any non-terminal status.
    ///
    /// Returns `false` when no transition happened.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_withdrawal_failed(
        &self,
        withdrawal_id: &str,
        reason: &str,
        updated_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals
            SET status = 'failed', failure_reason = ?, updated_at = ?
            WHERE withdrawal_id = ? AND status IN ('pending', 'broadcasting')
            "#,
        )
        .bind(reason)
        .bind(updated_at.as_ms())
        .bind(withdrawal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum of withdrawals a user requested since the cutoff, excluding
    /// failed ones (those were refunded). Drives the rolling daily limit.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_withdrawals_since(
        &self,
        user: &UserId,
        since: TimeMs,
    ) -> Result<Amount, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT amount
            FROM withdrawals
            WHERE user_id = ? AND created_at >= ? AND status != 'failed'
            "#,
        )
        .bind(user.as_str())
        .bind(since.as_ms())
        .fetch_all(&self.pool)
        .await?;

        let mut total = Amount::zero();
        for row in &rows {
            total = total + parse_amount(&row.get::<String, _>("amount"))?;
        }
        Ok(total)
    }

    /// Total amount (including fees) reserved by outstanding withdrawals.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn pending_withdrawal_total(&self, user: &UserId) -> Result<Amount, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT amount, fee
            FROM withdrawals
            WHERE user_id = ? AND status IN ('pending', 'broadcasting')
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut total = Amount::zero();
        for row in &rows {
            total = total
                + parse_amount(&row.get::<String, _>("amount"))?
                + parse_amount(&row.get::<String, _>("fee"))?;
        }
        Ok(total)
    }
}
