use super::core::Database;
use crate::notify::NotificationRequest;

impl Database {
    // created_at uses datetime('now') so the cooldown comparisons below stay
    // lexicographically valid.
    pub async fn insert_notification_request(
        &self,
        request: &NotificationRequest,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO notification_requests (
                recipient_user_id, template_key, template_params,
                related_report_id, related_match_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            "#,
        )
        .bind(&request.recipient_user_id)
        .bind(&request.template_key)
        .bind(request.template_params.to_string())
        .bind(&request.related_report_id)
        .bind(&request.related_match_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Whether a request for this match and template was already enqueued
    /// within the cooldown window.
    pub async fn recent_match_notification_exists(
        &self,
        match_id: &str,
        template_key: &str,
        within_minutes: i64,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notification_requests
            WHERE related_match_id = ?1
              AND template_key = ?2
              AND created_at > datetime('now', ?3)
            "#,
        )
        .bind(match_id)
        .bind(template_key)
        .bind(format!("-{} minutes", within_minutes))
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }

    /// Whether any request with this template was enqueued within the window,
    /// regardless of recipient. Used to dedup engine-failure alerts.
    pub async fn recent_template_notification_exists(
        &self,
        template_key: &str,
        within_minutes: i64,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notification_requests
            WHERE template_key = ?1
              AND created_at > datetime('now', ?2)
            "#,
        )
        .bind(template_key)
        .bind(format!("-{} minutes", within_minutes))
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }
}
