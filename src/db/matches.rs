use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::core::Database;
use crate::models::{MatchRecord, MatchStatus};
use crate::scoring::ScoreBreakdown;

fn match_from_row(row: &SqliteRow) -> Result<MatchRecord, sqlx::Error> {
    let status: String = row.get("status");

    Ok(MatchRecord {
        id: row.get("id"),
        lost_report_id: row.get("lost_report_id"),
        found_report_id: row.get("found_report_id"),
        image_score: row.get("image_score"),
        text_score: row.get("text_score"),
        location_score: row.get("location_score"),
        time_score: row.get("time_score"),
        final_score: row.get("final_score"),
        category_match: row.get::<i64, _>("category_match") != 0,
        status: MatchStatus::parse(&status)
            .ok_or_else(|| sqlx::Error::Protocol(format!("invalid match status: {}", status)))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl Database {
    /// Background upsert rule: insert a new pending row, or refresh the
    /// scores of an existing pending row. Terminal rows are left untouched
    /// and reported as `None`.
    pub async fn upsert_match(
        &self,
        lost_report_id: &str,
        found_report_id: &str,
        scores: &ScoreBreakdown,
    ) -> Result<Option<MatchRecord>, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            INSERT INTO matches (
                id, lost_report_id, found_report_id,
                image_score, text_score, location_score, time_score, final_score,
                category_match, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, ?10)
            ON CONFLICT(lost_report_id, found_report_id) DO UPDATE SET
                image_score = excluded.image_score,
                text_score = excluded.text_score,
                location_score = excluded.location_score,
                time_score = excluded.time_score,
                final_score = excluded.final_score,
                category_match = excluded.category_match,
                updated_at = excluded.updated_at
                WHERE matches.status = 'pending'
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(lost_report_id)
        .bind(found_report_id)
        .bind(scores.image_score)
        .bind(scores.text_score)
        .bind(scores.location_score)
        .bind(scores.time_score)
        .bind(scores.final_score)
        .bind(scores.category_match as i64)
        .bind(&now)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    /// Explicit upsert rule for operator-triggered re-checks: scores are
    /// always refreshed. Status is preserved unless `reset_status` is set,
    /// which drags even terminal rows back to pending.
    pub async fn force_upsert_match(
        &self,
        lost_report_id: &str,
        found_report_id: &str,
        scores: &ScoreBreakdown,
        reset_status: bool,
    ) -> Result<MatchRecord, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let status_clause = if reset_status {
            "status = 'pending',"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO matches (
                id, lost_report_id, found_report_id,
                image_score, text_score, location_score, time_score, final_score,
                category_match, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, ?10)
            ON CONFLICT(lost_report_id, found_report_id) DO UPDATE SET
                image_score = excluded.image_score,
                text_score = excluded.text_score,
                location_score = excluded.location_score,
                time_score = excluded.time_score,
                final_score = excluded.final_score,
                category_match = excluded.category_match,
                {status_clause}
                updated_at = excluded.updated_at
            RETURNING *
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(lost_report_id)
            .bind(found_report_id)
            .bind(scores.image_score)
            .bind(scores.text_score)
            .bind(scores.location_score)
            .bind(scores.time_score)
            .bind(scores.final_score)
            .bind(scores.category_match as i64)
            .bind(&now)
            .fetch_one(self.pool())
            .await?;

        match_from_row(&row)
    }

    pub async fn get_match(
        &self,
        lost_report_id: &str,
        found_report_id: &str,
    ) -> Result<Option<MatchRecord>, sqlx::Error> {
        let row =
            sqlx::query("SELECT * FROM matches WHERE lost_report_id = ?1 AND found_report_id = ?2")
                .bind(lost_report_id)
                .bind(found_report_id)
                .fetch_optional(self.pool())
                .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    pub async fn get_match_by_id(&self, id: &str) -> Result<Option<MatchRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    /// Every match touching the report, best first.
    pub async fn list_matches_for_report(
        &self,
        report_id: &str,
    ) -> Result<Vec<MatchRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM matches
            WHERE lost_report_id = ?1 OR found_report_id = ?1
            ORDER BY final_score DESC, created_at DESC
            "#,
        )
        .bind(report_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    /// Guarded delete for clear_and_rematch: pending rows only, unless the
    /// caller explicitly asks for terminal rows too.
    pub async fn delete_matches_for_report(
        &self,
        report_id: &str,
        include_terminal: bool,
    ) -> Result<u64, sqlx::Error> {
        let result = if include_terminal {
            sqlx::query("DELETE FROM matches WHERE lost_report_id = ?1 OR found_report_id = ?1")
                .bind(report_id)
                .execute(self.pool())
                .await?
        } else {
            sqlx::query(
                r#"
                DELETE FROM matches
                WHERE (lost_report_id = ?1 OR found_report_id = ?1)
                  AND status = 'pending'
                "#,
            )
            .bind(report_id)
            .execute(self.pool())
            .await?
        };

        Ok(result.rows_affected())
    }

    /// Reports a moderator already rejected against this one; the candidate
    /// selector skips them.
    pub async fn rejected_counterpart_ids(
        &self,
        report_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT CASE WHEN lost_report_id = ?1 THEN found_report_id ELSE lost_report_id END
            FROM matches
            WHERE (lost_report_id = ?1 OR found_report_id = ?1) AND status = 'rejected'
            "#,
        )
        .bind(report_id)
        .fetch_all(self.pool())
        .await
    }
}
