//! Affiliate and commission accrual operations for the repository.

use crate::domain::{Affiliate, Amount, CommissionAccrual, TimeMs, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{parse_amount, Repository};

const AFFILIATE_COLUMNS: &str = "affiliate_id, user_id, referral_code, commission_rate, \
     pending_commission, total_commission, created_at";

fn affiliate_from_row(row: &SqliteRow) -> Result<Affiliate, sqlx::Error> {
    Ok(Affiliate {
        affiliate_id: row.get::<String, _>("affiliate_id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        referral_code: row.get::<String, _>("referral_code"),
        commission_rate: parse_amount(&row.get::<String, _>("commission_rate"))?,
        pending_commission: parse_amount(&row.get::<String, _>("pending_commission"))?,
        total_commission: parse_amount(&row.get::<String, _>("total_commission"))?,
        created_at: TimeMs::new(row.get::<i64, _>("created_at")),
    })
}

impl Repository {
    /// Insert a new affiliate record.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including referral code collisions).
    pub async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO affiliates (
                affiliate_id, user_id, referral_code, commission_rate,
                pending_commission, total_commission, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&affiliate.affiliate_id)
        .bind(affiliate.user_id.as_str())
        .bind(&affiliate.referral_code)
        .bind(affiliate.commission_rate.to_canonical_string())
        .bind(affiliate.pending_commission.to_canonical_string())
        .bind(affiliate.total_commission.to_canonical_string())
        .bind(affiliate.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch an affiliate by its id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_affiliate(
        &self,
        affiliate_id: &str,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM affiliates WHERE affiliate_id = ?",
            AFFILIATE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(affiliate_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(affiliate_from_row).transpose()
    }

    /// Fetch an affiliate by the owning user.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_affiliate_by_user(
        &self,
        user: &UserId,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM affiliates WHERE user_id = ?",
            AFFILIATE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(affiliate_from_row).transpose()
    }

    /// Fetch an affiliate by referral code.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_affiliate_by_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM affiliates WHERE referral_code = ?",
            AFFILIATE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(referral_code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(affiliate_from_row).transpose()
    }

    /// Record a commission accrual and bump the affiliate's pending balance,
    /// deduplicated by the bet's idempotency key.
    ///
    /// The pending balance is re-read and rewritten inside the same write
    /// transaction as the accrual insert, so concurrent accruals for one
    /// affiliate serialize on the database writer and never lose updates.
    ///
    /// Returns `false` when the accrual already existed (nothing changed).
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_accrual(&self, accrual: &CommissionAccrual) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO commission_accruals (
                bet_key, affiliate_id, referred_user_id, amount, reversed, created_at
            ) VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT(bet_key) DO NOTHING
            "#,
        )
        .bind(&accrual.bet_key)
        .bind(&accrual.affiliate_id)
        .bind(accrual.referred_user_id.as_str())
        .bind(accrual.amount.to_canonical_string())
        .bind(accrual.created_at.as_ms())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let row = sqlx::query("SELECT pending_commission FROM affiliates WHERE affiliate_id = ?")
            .bind(&accrual.affiliate_id)
            .fetch_one(&mut *tx)
            .await?;
        let pending = parse_amount(&row.get::<String, _>("pending_commission"))?;
        let new_pending = pending + accrual.amount;

        sqlx::query(
            r#"
            UPDATE affiliates
            SET pending_commission = ?
            WHERE affiliate_id = ?
            "#,
        )
        .bind(new_pending.to_canonical_string())
        .bind(&accrual.affiliate_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Fetch an accrual by its bet key.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_accrual(
        &self,
        bet_key: &str,
    ) -> Result<Option<CommissionAccrual>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT bet_key, affiliate_id, referred_user_id, amount, reversed, created_at
            FROM commission_accruals
            WHERE bet_key = ?
            "#,
        )
        .bind(bet_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(CommissionAccrual {
                bet_key: row.get::<String, _>("bet_key"),
                affiliate_id: row.get::<String, _>("affiliate_id"),
                referred_user_id: UserId::new(row.get::<String, _>("referred_user_id")),
                amount: parse_amount(&row.get::<String, _>("amount"))?,
                reversed: row.get::<i64, _>("reversed") != 0,
                created_at: TimeMs::new(row.get::<i64, _>("created_at")),
            })
        })
        .transpose()
    }

    /// Mark an accrual reversed and deduct it from the pending balance.
    ///
    /// Guarded on `reversed = 0` so a repeated void changes nothing. The
    /// pending balance is re-read inside the same write transaction and
    /// clamps at zero when the commission was already withdrawn.
    /// Returns `false` when the accrual was already reversed or missing.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn reverse_accrual(
        &self,
        bet_key: &str,
        affiliate_id: &str,
        amount: Amount,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let reversed = sqlx::query(
            r#"
            UPDATE commission_accruals
            SET reversed = 1
            WHERE bet_key = ? AND reversed = 0
            "#,
        )
        .bind(bet_key)
        .execute(&mut *tx)
        .await?;

        if reversed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let row = sqlx::query("SELECT pending_commission FROM affiliates WHERE affiliate_id = ?")
            .bind(affiliate_id)
            .fetch_one(&mut *tx)
            .await?;
        let pending = parse_amount(&row.get::<String, _>("pending_commission"))?;
        let mut new_pending = pending - amount;
        if new_pending.is_negative() {
            warn!(
                affiliate = %affiliate_id,
                bet_key,
                "accrual reversal exceeds pending commission, clamping to zero"
            );
            new_pending = Amount::zero();
        }

        sqlx::query(
            r#"
            UPDATE affiliates
            SET pending_commission = ?
            WHERE affiliate_id = ?
            "#,
        )
        .bind(new_pending.to_canonical_string())
        .bind(affiliate_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Compare-and-swap update of an affiliate's commission balances.
    ///
    /// The swap is keyed on the current pending value so concurrent
    /// commission withdrawals serialize; a miss means the caller must
    /// reload and retry.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn cas_commission_balances(
        &self,
        affiliate_id: &str,
        expected_pending: Amount,
        new_pending: Amount,
        new_total: Amount,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE affiliates
            SET pending_commission = ?, total_commission = ?
            WHERE affiliate_id = ? AND pending_commission = ?
            "#,
        )
        .bind(new_pending.to_canonical_string())
        .bind(new_total.to_canonical_string())
        .bind(affiliate_id)
        .bind(expected_pending.to_canonical_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
