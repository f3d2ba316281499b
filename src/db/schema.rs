use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                short_id INTEGER NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL, -- lost, found
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                color TEXT,
                distinguishing_marks TEXT,
                city TEXT,
                address TEXT,
                latitude REAL,
                longitude REAL,
                occurred_on TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reports_kind_status ON reports (kind, status);
            CREATE INDEX IF NOT EXISTS idx_reports_short_id ON reports (short_id);

            CREATE TABLE IF NOT EXISTS report_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                image_url TEXT NOT NULL,
                ai_description TEXT,     -- arrives from the enrichment pipeline or never
                fingerprint TEXT,        -- 64-bit average hash as 16 hex chars
                histogram TEXT,          -- 24 normalized RGB bins as JSON
                FOREIGN KEY (report_id) REFERENCES reports (id) ON DELETE CASCADE,
                UNIQUE(report_id, image_url)
            );
            CREATE INDEX IF NOT EXISTS idx_report_images_report_id ON report_images (report_id);

            -- One row per ordered (lost, found) pair; the uniqueness constraint
            -- is the sole concurrency guard for recomputation.
            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                lost_report_id TEXT NOT NULL,
                found_report_id TEXT NOT NULL,
                image_score REAL NOT NULL DEFAULT 0,
                text_score REAL NOT NULL DEFAULT 0,
                location_score REAL NOT NULL DEFAULT 0,
                time_score REAL NOT NULL DEFAULT 0,
                final_score REAL NOT NULL DEFAULT 0,
                category_match INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'pending', -- pending, confirmed, rejected
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (lost_report_id) REFERENCES reports (id) ON DELETE CASCADE,
                FOREIGN KEY (found_report_id) REFERENCES reports (id) ON DELETE CASCADE,
                UNIQUE(lost_report_id, found_report_id)
            );
            CREATE INDEX IF NOT EXISTS idx_matches_lost_report_id ON matches (lost_report_id);
            CREATE INDEX IF NOT EXISTS idx_matches_found_report_id ON matches (found_report_id);
            CREATE INDEX IF NOT EXISTS idx_matches_status_score ON matches (status, final_score);

            -- Outbox for the notification collaborator; delivery happens elsewhere.
            CREATE TABLE IF NOT EXISTS notification_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_user_id TEXT NOT NULL,
                template_key TEXT NOT NULL,
                template_params TEXT NOT NULL,
                related_report_id TEXT,
                related_match_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notification_requests_match
                ON notification_requests (related_match_id, template_key, created_at);
            CREATE INDEX IF NOT EXISTS idx_notification_requests_template
                ON notification_requests (template_key, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Schema initialized");
        Ok(())
    }
}
