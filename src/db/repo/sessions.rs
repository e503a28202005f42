//! Game session operations for the repository.

use crate::domain::{Amount, GameSession, SessionStatus, TimeMs, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_amount, Repository};

const SESSION_COLUMNS: &str = "session_id, user_id, match_id, game_type, bet_amount, \
     status, last_score, final_score, final_rank, payout, created_at, ended_at";

fn session_from_row(row: &SqliteRow) -> Result<GameSession, sqlx::Error> {
    let status_str = row.get::<String, _>("status");
    let status = SessionStatus::parse(&status_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown session status: {}", status_str).into())
    })?;

    Ok(GameSession {
        session_id: row.get::<String, _>("session_id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        match_id: row.get::<Option<String>, _>("match_id"),
        game_type: row.get::<String, _>("game_type"),
        bet_amount: parse_amount(&row.get::<String, _>("bet_amount"))?,
        status,
        last_score: row.get::<Option<i64>, _>("last_score"),
        final_score: row.get::<Option<i64>, _>("final_score"),
        final_rank: row.get::<Option<i64>, _>("final_rank"),
        payout: row
            .get::<Option<String>, _>("payout")
            .as_deref()
            .map(parse_amount)
            .transpose()?,
        created_at: TimeMs::new(row.get::<i64, _>("created_at")),
        ended_at: row.get::<Option<i64>, _>("ended_at").map(TimeMs::new),
    })
}

impl Repository {
    /// Insert a new game session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_session(&self, session: &GameSession) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO game_sessions (
                session_id, user_id, match_id, game_type, bet_amount,
                status, last_score, final_score, final_rank, payout,
                created_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id.as_str())
        .bind(session.match_id.as_deref())
        .bind(&session.game_type)
        .bind(session.bet_amount.to_canonical_string())
        .bind(session.status.as_str())
        .bind(session.last_score)
        .bind(session.final_score)
        .bind(session.final_rank)
        .bind(session.payout.map(|p| p.to_canonical_string()))
        .bind(session.created_at.as_ms())
        .bind(session.ended_at.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_sessions WHERE session_id = ?",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    /// Record an informational score update on an active session.
    ///
    /// Returns `false` when the session is missing or no longer active.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_session_score(
        &self,
        session_id: &str,
        score: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE game_sessions
            SET last_score = ?
            WHERE session_id = ? AND status = 'active'
            "#,
        )
        .bind(score)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition an active session to `ended` with its settlement result.
    ///
    /// Guarded on the current status so a racing close cannot overwrite a
    /// prior result. Returns `false` when the session was not active.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn close_session(
        &self,
        session_id: &str,
        final_score: i64,
        final_rank: i64,
        payout: Amount,
        ended_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE game_sessions
            SET status = 'ended', final_score = ?, final_rank = ?, payout = ?, ended_at = ?
            WHERE session_id = ? AND status = 'active'
            "#,
        )
        .bind(final_score)
        .bind(final_rank)
        .bind(payout.to_canonical_string())
        .bind(ended_at.as_ms())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition an active session to `void`.
    ///
    /// Returns `false` when the session was not active.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn void_session(
        &self,
        session_id: &str,
        ended_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE game_sessions
            SET status = 'void', ended_at = ?
            WHERE session_id = ? AND status = 'active'
            "#,
        )
        .bind(ended_at.as_ms())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Query all sessions belonging to a match, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_sessions_by_match(
        &self,
        match_id: &str,
    ) -> Result<Vec<GameSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_sessions WHERE match_id = ? \
             ORDER BY created_at ASC, session_id ASC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(match_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// Query sessions still `active` that were created before the cutoff.
    ///
    /// Used by the external reconciliation sweep to find orphaned sessions
    /// to void.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_stale_sessions(
        &self,
        created_before: TimeMs,
    ) -> Result<Vec<GameSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_sessions WHERE status = 'active' AND created_at < ? \
             ORDER BY created_at ASC, session_id ASC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(created_before.as_ms())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }
}
