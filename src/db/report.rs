use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::core::Database;
use crate::models::{Report, ReportImage, ReportKind, ReportStatus};

fn report_from_row(row: &SqliteRow) -> Result<Report, sqlx::Error> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");

    Ok(Report {
        id: row.get("id"),
        short_id: row.get("short_id"),
        user_id: row.get("user_id"),
        kind: ReportKind::parse(&kind)
            .ok_or_else(|| sqlx::Error::Protocol(format!("invalid report kind: {}", kind)))?,
        title: row.get("title"),
        description: row.get("description"),
        category: row.get("category"),
        color: row.get("color"),
        distinguishing_marks: row.get("distinguishing_marks"),
        city: row.get("city"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        occurred_on: row.get("occurred_on"),
        status: ReportStatus::parse(&status)
            .ok_or_else(|| sqlx::Error::Protocol(format!("invalid report status: {}", status)))?,
        images: Vec::new(),
    })
}

fn image_from_row(row: &SqliteRow) -> ReportImage {
    let fingerprint: Option<String> = row.get("fingerprint");
    let histogram: Option<String> = row.get("histogram");

    ReportImage {
        image_url: row.get("image_url"),
        ai_description: row.get("ai_description"),
        fingerprint: fingerprint.and_then(|hex| u64::from_str_radix(&hex, 16).ok()),
        histogram: histogram.and_then(|json| serde_json::from_str(&json).ok()),
    }
}

impl Database {
    /// Store a new report with its images, assigning the next short id.
    /// Returns the assigned short id.
    pub async fn insert_report(&self, report: &Report) -> Result<i64, sqlx::Error> {
        let short_id: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(short_id), 0) + 1 FROM reports")
                .fetch_one(self.pool())
                .await?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, short_id, user_id, kind, title, description, category,
                color, distinguishing_marks, city, address, latitude, longitude,
                occurred_on, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
            "#,
        )
        .bind(&report.id)
        .bind(short_id)
        .bind(&report.user_id)
        .bind(report.kind.as_str())
        .bind(&report.title)
        .bind(&report.description)
        .bind(&report.category)
        .bind(&report.color)
        .bind(&report.distinguishing_marks)
        .bind(&report.city)
        .bind(&report.address)
        .bind(report.latitude)
        .bind(report.longitude)
        .bind(&report.occurred_on)
        .bind(report.status.as_str())
        .bind(&now)
        .execute(self.pool())
        .await?;

        for (position, image) in report.images.iter().enumerate() {
            self.attach_image(&report.id, position as i64, image).await?;
        }

        Ok(short_id)
    }

    async fn attach_image(
        &self,
        report_id: &str,
        position: i64,
        image: &ReportImage,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO report_images (report_id, position, image_url, ai_description, fingerprint, histogram)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(report_id, image_url) DO UPDATE SET
                position = excluded.position,
                ai_description = excluded.ai_description
            "#,
        )
        .bind(report_id)
        .bind(position)
        .bind(&image.image_url)
        .bind(&image.ai_description)
        .bind(image.fingerprint.map(|f| format!("{:016x}", f)))
        .bind(
            image
                .histogram
                .as_ref()
                .and_then(|h| serde_json::to_string(h).ok()),
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn load_images(&self, report_id: &str) -> Result<Vec<ReportImage>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT image_url, ai_description, fingerprint, histogram
             FROM report_images WHERE report_id = ?1 ORDER BY position",
        )
        .bind(report_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(image_from_row).collect())
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<Report>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let mut report = report_from_row(&row)?;
                report.images = self.load_images(&report.id).await?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    pub async fn get_report_by_short_id(
        &self,
        short_id: i64,
    ) -> Result<Option<Report>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM reports WHERE short_id = ?1")
            .bind(short_id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let mut report = report_from_row(&row)?;
                report.images = self.load_images(&report.id).await?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// All reports of the given kind still eligible for matching, with their
    /// images loaded. Reflects current store state, not a snapshot.
    pub async fn list_open_reports(
        &self,
        kind: ReportKind,
        excluding_report_id: &str,
    ) -> Result<Vec<Report>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM reports
            WHERE kind = ?1
              AND status NOT IN ('delivered', 'closed')
              AND id != ?2
            "#,
        )
        .bind(kind.as_str())
        .bind(excluding_report_id)
        .fetch_all(self.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut report = report_from_row(row)?;
            report.images = self.load_images(&report.id).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Every report of a kind, whatever its status. The debug analysis wants
    /// the full picture, including pairs routine matching would skip.
    pub async fn list_reports_of_kind(
        &self,
        kind: ReportKind,
        excluding_report_id: &str,
    ) -> Result<Vec<Report>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM reports WHERE kind = ?1 AND id != ?2")
            .bind(kind.as_str())
            .bind(excluding_report_id)
            .fetch_all(self.pool())
            .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut report = report_from_row(row)?;
            report.images = self.load_images(&report.id).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub async fn list_open_report_ids(&self, kind: ReportKind) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM reports
            WHERE kind = ?1 AND status NOT IN ('delivered', 'closed')
            ORDER BY created_at DESC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await
    }

    /// Generic status update. `delivered` is refused here: that transition
    /// must go through the lifecycle manager so the paired report moves too.
    pub async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
    ) -> Result<bool, sqlx::Error> {
        if status == ReportStatus::Delivered {
            return Err(sqlx::Error::Protocol(
                "delivered is set via lifecycle::mark_delivered only".into(),
            ));
        }

        let result = sqlx::query("UPDATE reports SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the visual signature produced by the enrichment job.
    pub async fn update_image_signature(
        &self,
        report_id: &str,
        image_url: &str,
        fingerprint: u64,
        histogram: &[f32],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE report_images SET fingerprint = ?1, histogram = ?2
            WHERE report_id = ?3 AND image_url = ?4
            "#,
        )
        .bind(format!("{:016x}", fingerprint))
        .bind(serde_json::to_string(histogram).unwrap_or_default())
        .bind(report_id)
        .bind(image_url)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Image URLs on this report that still lack a visual signature.
    pub async fn images_missing_signature(
        &self,
        report_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT image_url FROM report_images
            WHERE report_id = ?1 AND (fingerprint IS NULL OR histogram IS NULL)
            ORDER BY position
            "#,
        )
        .bind(report_id)
        .fetch_all(self.pool())
        .await
    }
}
