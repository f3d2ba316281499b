use serde_json::json;
use tracing::{debug, error};

use crate::db::Database;
use crate::models::{MatchRecord, ReportStatus};
use crate::TARGET_NOTIFY;

pub const TEMPLATE_MATCH_POTENTIAL: &str = "notif_match_potential";
pub const TEMPLATE_MATCH_CONFIRMED: &str = "notif_match_confirmed";
pub const TEMPLATE_STATUS_CHANGE: &str = "notif_status_change";
pub const TEMPLATE_ENGINE_FAILURE: &str = "notif_engine_failure";

/// At most one moderator ping per match per hour, however often the scores
/// get refreshed underneath it.
const MATCH_NOTIFY_COOLDOWN_MINUTES: i64 = 60;
const FAILURE_ALERT_COOLDOWN_MINUTES: i64 = 30;

/// One request handed to the notification collaborator. Delivery is that
/// service's problem; we only enqueue.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub recipient_user_id: String,
    pub template_key: String,
    pub template_params: serde_json::Value,
    pub related_report_id: Option<String>,
    pub related_match_id: Option<String>,
}

/// Ask moderators to review a pending match. Fire-and-forget: failures are
/// logged and never propagate into the scoring pass that raised them.
pub async fn notify_moderators_of_match(
    db: &Database,
    moderators: &[String],
    record: &MatchRecord,
    lost_title: &str,
    found_title: &str,
) {
    match db
        .recent_match_notification_exists(
            &record.id,
            TEMPLATE_MATCH_POTENTIAL,
            MATCH_NOTIFY_COOLDOWN_MINUTES,
        )
        .await
    {
        Ok(true) => {
            debug!(
                target: TARGET_NOTIFY,
                "Match {} notified within cooldown, skipping", record.id
            );
            return;
        }
        Ok(false) => {}
        Err(error) => {
            error!(target: TARGET_NOTIFY, "Cooldown check failed: {}", error);
            return;
        }
    }

    let params = json!({
        "score": (record.final_score * 100.0).round() as i64,
        "lost_title": lost_title,
        "found_title": found_title,
    });

    for user_id in moderators {
        let request = NotificationRequest {
            recipient_user_id: user_id.clone(),
            template_key: TEMPLATE_MATCH_POTENTIAL.to_string(),
            template_params: params.clone(),
            related_report_id: None,
            related_match_id: Some(record.id.clone()),
        };
        if let Err(error) = db.insert_notification_request(&request).await {
            error!(
                target: TARGET_NOTIFY,
                "Failed to enqueue match notification for {}: {}", user_id, error
            );
        }
    }

    debug!(
        target: TARGET_NOTIFY,
        "Match {} notification enqueued for {} moderators",
        record.id,
        moderators.len()
    );
}

/// Tell a report owner their item was matched.
pub async fn notify_owner_of_confirmed_match(
    db: &Database,
    user_id: &str,
    own_title: &str,
    counterpart_title: &str,
    report_id: &str,
    match_id: &str,
) {
    let request = NotificationRequest {
        recipient_user_id: user_id.to_string(),
        template_key: TEMPLATE_MATCH_CONFIRMED.to_string(),
        template_params: json!({
            "own_title": own_title,
            "counterpart_title": counterpart_title,
        }),
        related_report_id: Some(report_id.to_string()),
        related_match_id: Some(match_id.to_string()),
    };
    if let Err(error) = db.insert_notification_request(&request).await {
        error!(
            target: TARGET_NOTIFY,
            "Failed to enqueue confirmation notification for {}: {}", user_id, error
        );
    }
}

/// Tell a report owner their report changed status.
pub async fn notify_owner_of_status_change(
    db: &Database,
    user_id: &str,
    report_title: &str,
    status: ReportStatus,
    report_id: &str,
) {
    let request = NotificationRequest {
        recipient_user_id: user_id.to_string(),
        template_key: TEMPLATE_STATUS_CHANGE.to_string(),
        template_params: json!({
            "report_title": report_title,
            "status": status.as_str(),
        }),
        related_report_id: Some(report_id.to_string()),
        related_match_id: None,
    };
    if let Err(error) = db.insert_notification_request(&request).await {
        error!(
            target: TARGET_NOTIFY,
            "Failed to enqueue status notification for {}: {}", user_id, error
        );
    }
}

/// Raise a deduplicated engine-failure alert so a broken scoring pass does
/// not fail silently, and a flapping one does not spam.
pub async fn alert_engine_failure(
    db: &Database,
    moderators: &[String],
    report_id: Option<&str>,
    error: &anyhow::Error,
) {
    match db
        .recent_template_notification_exists(
            TEMPLATE_ENGINE_FAILURE,
            FAILURE_ALERT_COOLDOWN_MINUTES,
        )
        .await
    {
        Ok(true) => return,
        Ok(false) => {}
        Err(check_error) => {
            error!(
                target: TARGET_NOTIFY,
                "Failure-alert cooldown check failed: {}", check_error
            );
            return;
        }
    }

    let message: String = format!("{:#}", error).chars().take(200).collect();

    for user_id in moderators {
        let request = NotificationRequest {
            recipient_user_id: user_id.clone(),
            template_key: TEMPLATE_ENGINE_FAILURE.to_string(),
            template_params: json!({ "error": message }),
            related_report_id: report_id.map(String::from),
            related_match_id: None,
        };
        if let Err(insert_error) = db.insert_notification_request(&request).await {
            error!(
                target: TARGET_NOTIFY,
                "Failed to enqueue failure alert: {}", insert_error
            );
        }
    }
}
