//! Moderator-facing transitions over Match.status and Report.status, plus
//! the delivery synchronization that closes both halves of an exchange
//! together.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{MatchStatus, ReportStatus};
use crate::notify;
use crate::TARGET_ENGINE;

/// Confirm a pending match: the match becomes terminal, both reports advance
/// to `matched` unless they are already further along, and both owners are
/// notified. Returns false when the match is missing or already decided.
pub async fn confirm(db: &Database, match_id: &str) -> Result<bool> {
    let Some(record) = db.get_match_by_id(match_id).await? else {
        warn!(target: TARGET_ENGINE, "confirm: match {} not found", match_id);
        return Ok(false);
    };
    if record.status.is_terminal() {
        warn!(
            target: TARGET_ENGINE,
            "confirm: match {} is already {}", match_id, record.status
        );
        return Ok(false);
    }

    let now = Utc::now().to_rfc3339();
    let mut tx = db.pool().begin().await?;

    // Status check repeated inside the transaction; a concurrent decision wins
    let updated =
        sqlx::query("UPDATE matches SET status = 'confirmed', updated_at = ?1 WHERE id = ?2 AND status = 'pending'")
            .bind(&now)
            .bind(match_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    if updated == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for report_id in [&record.lost_report_id, &record.found_report_id] {
        sqlx::query(
            r#"
            UPDATE reports SET status = 'matched', updated_at = ?1
            WHERE id = ?2 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(&now)
        .bind(report_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let lost = db.get_report(&record.lost_report_id).await?;
    let found = db.get_report(&record.found_report_id).await?;
    if let (Some(lost), Some(found)) = (lost, found) {
        notify::notify_owner_of_confirmed_match(
            db,
            &lost.user_id,
            &lost.title,
            &found.title,
            &lost.id,
            match_id,
        )
        .await;
        notify::notify_owner_of_confirmed_match(
            db,
            &found.user_id,
            &found.title,
            &lost.title,
            &found.id,
            match_id,
        )
        .await;
    }

    info!(target: TARGET_ENGINE, "Match {} confirmed", match_id);
    Ok(true)
}

/// Reject a pending match. Report statuses are left alone: a report may
/// still match something else.
pub async fn reject(db: &Database, match_id: &str) -> Result<bool> {
    let updated = sqlx::query(
        "UPDATE matches SET status = 'rejected', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(match_id)
    .execute(db.pool())
    .await?
    .rows_affected();

    if updated == 0 {
        warn!(
            target: TARGET_ENGINE,
            "reject: match {} missing or already decided", match_id
        );
        return Ok(false);
    }

    info!(target: TARGET_ENGINE, "Match {} rejected", match_id);
    Ok(true)
}

/// Mark a report delivered and close its exchange: every non-rejected match
/// touching it is confirmed and every counterpart report is delivered too,
/// in one transaction so no partial state is ever observable.
pub async fn mark_delivered(db: &Database, report_id: &str) -> Result<bool> {
    let Some(report) = db.get_report(report_id).await? else {
        warn!(target: TARGET_ENGINE, "mark_delivered: report {} not found", report_id);
        return Ok(false);
    };

    let now = Utc::now().to_rfc3339();
    let mut tx = db.pool().begin().await?;

    sqlx::query("UPDATE reports SET status = 'delivered', updated_at = ?1 WHERE id = ?2")
        .bind(&now)
        .bind(report_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE matches SET status = 'confirmed', updated_at = ?1
        WHERE (lost_report_id = ?2 OR found_report_id = ?2) AND status != 'rejected'
        "#,
    )
    .bind(&now)
    .bind(report_id)
    .execute(&mut *tx)
    .await?;

    let counterpart_ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT CASE WHEN lost_report_id = ?1 THEN found_report_id ELSE lost_report_id END
        FROM matches
        WHERE (lost_report_id = ?1 OR found_report_id = ?1) AND status = 'confirmed'
        "#,
    )
    .bind(report_id)
    .fetch_all(&mut *tx)
    .await?;

    for counterpart_id in &counterpart_ids {
        sqlx::query("UPDATE reports SET status = 'delivered', updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(counterpart_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    // Status-change notifications after commit; delivery problems never roll
    // back the transition
    notify::notify_owner_of_status_change(
        db,
        &report.user_id,
        &report.title,
        ReportStatus::Delivered,
        &report.id,
    )
    .await;
    for counterpart_id in &counterpart_ids {
        if let Some(counterpart) = db.get_report(counterpart_id).await? {
            notify::notify_owner_of_status_change(
                db,
                &counterpart.user_id,
                &counterpart.title,
                ReportStatus::Delivered,
                &counterpart.id,
            )
            .await;
        }
    }

    info!(
        target: TARGET_ENGINE,
        "Report {} delivered together with {} counterpart(s)",
        report.short_id,
        counterpart_ids.len()
    );
    Ok(true)
}

/// Walk a confirmation back to pending and both reports back to `matched`.
pub async fn undo_confirmation(db: &Database, match_id: &str) -> Result<bool> {
    let Some(record) = db.get_match_by_id(match_id).await? else {
        return Ok(false);
    };
    if record.status != MatchStatus::Confirmed {
        return Ok(false);
    }

    let now = Utc::now().to_rfc3339();
    let mut tx = db.pool().begin().await?;

    sqlx::query("UPDATE matches SET status = 'pending', updated_at = ?1 WHERE id = ?2")
        .bind(&now)
        .bind(match_id)
        .execute(&mut *tx)
        .await?;

    for report_id in [&record.lost_report_id, &record.found_report_id] {
        sqlx::query("UPDATE reports SET status = 'matched', updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(report_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(target: TARGET_ENGINE, "Match {} confirmation undone", match_id);
    Ok(true)
}

/// Reopen a delivered exchange: both reports drop back to `matched` so the
/// delivery can be redone, while the match itself stays confirmed.
pub async fn undo_delivery(db: &Database, report_id: &str) -> Result<bool> {
    let confirmed: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT lost_report_id, found_report_id FROM matches
        WHERE (lost_report_id = ?1 OR found_report_id = ?1) AND status = 'confirmed'
        "#,
    )
    .bind(report_id)
    .fetch_all(db.pool())
    .await?;

    let now = Utc::now().to_rfc3339();

    if confirmed.is_empty() {
        // No confirmed exchange; just walk this report back
        let updated =
            sqlx::query("UPDATE reports SET status = 'matched', updated_at = ?1 WHERE id = ?2")
                .bind(&now)
                .bind(report_id)
                .execute(db.pool())
                .await?
                .rows_affected();
        return Ok(updated > 0);
    }

    let mut tx = db.pool().begin().await?;
    for (lost_id, found_id) in &confirmed {
        for id in [lost_id, found_id] {
            sqlx::query("UPDATE reports SET status = 'matched', updated_at = ?1 WHERE id = ?2")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;

    info!(target: TARGET_ENGINE, "Delivery undone for report {}", report_id);
    Ok(true)
}
