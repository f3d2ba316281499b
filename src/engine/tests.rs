use uuid::Uuid;

use crate::config::{self, MatchSettings};
use crate::db::Database;
use crate::engine::MatchingEngine;
use crate::lifecycle;
use crate::models::{MatchStatus, Report, ReportKind, ReportStatus};

fn sample_report(kind: ReportKind, title: &str) -> Report {
    Report {
        id: Uuid::new_v4().to_string(),
        short_id: 0,
        user_id: format!("owner-of-{}", title),
        kind,
        title: title.into(),
        description: "black leather laptop bag with a red zipper".into(),
        category: "bags".into(),
        color: Some("black".into()),
        distinguishing_marks: None,
        city: Some("Riyadh".into()),
        address: None,
        latitude: Some(24.7136),
        longitude: Some(46.6753),
        occurred_on: "2025-03-10".into(),
        status: ReportStatus::Pending,
        images: Vec::new(),
    }
}

async fn test_engine() -> MatchingEngine {
    let db = Database::new_in_memory().await.expect("in-memory database");
    MatchingEngine::new(db, config::shared(MatchSettings::default()))
}

async fn seed(engine: &MatchingEngine, report: &Report) {
    engine
        .db()
        .insert_report(report)
        .await
        .expect("seed report");
}

#[tokio::test]
async fn run_with_no_candidates_creates_nothing() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    seed(&engine, &lost).await;

    let written = engine.run(&lost.id).await.unwrap();
    assert_eq!(written, 0);

    let rows = engine.db().list_matches_for_report(&lost.id).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn run_twice_is_idempotent() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    let first = engine.run(&lost.id).await.unwrap();
    assert_eq!(first, 1);

    let before = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();

    let second = engine.run(&lost.id).await.unwrap();
    assert_eq!(second, 1);

    let rows = engine.db().list_matches_for_report(&lost.id).await.unwrap();
    assert_eq!(rows.len(), 1, "re-running must not duplicate rows");

    let after = &rows[0];
    assert_eq!(after.id, before.id);
    assert_eq!(after.final_score, before.final_score);
    assert_eq!(after.status, MatchStatus::Pending);
}

#[tokio::test]
async fn matches_move_a_pending_report_into_processing() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();

    let report = engine.db().get_report(&lost.id).await.unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Processing);
}

#[tokio::test]
async fn routine_runs_never_touch_terminal_rows() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert!(lifecycle::confirm(engine.db(), &record.id).await.unwrap());

    // Change the underlying data so a fresh scoring pass would produce
    // different numbers
    sqlx::query("UPDATE reports SET title = 'something else entirely' WHERE id = ?1")
        .bind(&found.id)
        .execute(engine.db().pool())
        .await
        .unwrap();

    engine.run(&lost.id).await.unwrap();
    engine.run_full_scan().await.unwrap();

    let untouched = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, MatchStatus::Confirmed);
    assert_eq!(untouched.final_score, record.final_score);
    assert_eq!(untouched.text_score, record.text_score);
}

#[tokio::test]
async fn rejected_pairs_leave_candidate_selection() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert!(lifecycle::reject(engine.db(), &record.id).await.unwrap());

    // Report statuses stay put on rejection
    let report = engine.db().get_report(&found.id).await.unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Pending);

    let written = engine.run(&lost.id).await.unwrap();
    assert_eq!(written, 0, "a rejected pair must not be rescored");

    let row = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert_eq!(row.status, MatchStatus::Rejected);
}

#[tokio::test]
async fn score_pair_bypasses_the_persistence_floor() {
    let engine = test_engine().await;
    let mut lost = sample_report(ReportKind::Lost, "lost bag");
    lost.description = "black leather laptop bag".into();
    lost.latitude = None;
    lost.longitude = None;
    lost.city = Some("Riyadh".into());

    let mut found = sample_report(ReportKind::Found, "golden ring");
    found.description = "small golden wedding ring engraved".into();
    found.latitude = None;
    found.longitude = None;
    found.city = Some("Jeddah".into());
    found.occurred_on = "2024-01-01".into();

    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    let written = engine.run(&lost.id).await.unwrap();
    assert_eq!(written, 0, "a sub-floor pair is not persisted by run()");

    let record = engine.score_pair(&lost.id, &found.id, false).await.unwrap();
    assert!(record.final_score < MatchSettings::default().persist_floor);

    let stored = engine.db().get_match(&lost.id, &found.id).await.unwrap();
    assert!(stored.is_some(), "score_pair persists regardless of score");
}

#[tokio::test]
async fn score_pair_on_a_rejected_pair_keeps_the_decision_unless_forced() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    lifecycle::reject(engine.db(), &record.id).await.unwrap();

    let refreshed = engine.score_pair(&lost.id, &found.id, false).await.unwrap();
    assert_eq!(refreshed.status, MatchStatus::Rejected);

    let reopened = engine.score_pair(&lost.id, &found.id, true).await.unwrap();
    assert_eq!(reopened.status, MatchStatus::Pending);
}

#[tokio::test]
async fn score_pair_validates_report_kinds() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let also_lost = sample_report(ReportKind::Lost, "another lost bag");
    seed(&engine, &lost).await;
    seed(&engine, &also_lost).await;

    assert!(engine.score_pair(&lost.id, &also_lost.id, false).await.is_err());
}

#[tokio::test]
async fn clear_and_rematch_preserves_terminal_rows_by_default() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    let second_found = sample_report(ReportKind::Found, "second found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;
    seed(&engine, &second_found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    lifecycle::confirm(engine.db(), &record.id).await.unwrap();

    engine.clear_and_rematch(&lost.id, false).await.unwrap();

    let kept = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert_eq!(kept.id, record.id, "the confirmed row survived the clear");
    assert_eq!(kept.status, MatchStatus::Confirmed);

    let rebuilt = engine.db().get_match(&lost.id, &second_found.id).await.unwrap().unwrap();
    assert_eq!(rebuilt.status, MatchStatus::Pending);
}

#[tokio::test]
async fn full_scan_reports_aggregate_counts() {
    let engine = test_engine().await;
    let lost_a = sample_report(ReportKind::Lost, "lost bag one");
    let lost_b = sample_report(ReportKind::Lost, "lost bag two");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost_a).await;
    seed(&engine, &lost_b).await;
    seed(&engine, &found).await;

    let outcome = engine.run_full_scan().await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.matches, 2);
}

#[tokio::test]
async fn delivery_synchronizes_every_counterpart() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found_a = sample_report(ReportKind::Found, "found bag A");
    let found_b = sample_report(ReportKind::Found, "found bag B");
    seed(&engine, &lost).await;
    seed(&engine, &found_a).await;
    seed(&engine, &found_b).await;

    let written = engine.run(&lost.id).await.unwrap();
    assert_eq!(written, 2);

    assert!(lifecycle::mark_delivered(engine.db(), &lost.id).await.unwrap());

    for report_id in [&lost.id, &found_a.id, &found_b.id] {
        let report = engine.db().get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Delivered, "report {}", report_id);
    }
    for row in engine.db().list_matches_for_report(&lost.id).await.unwrap() {
        assert_eq!(row.status, MatchStatus::Confirmed);
    }
}

#[tokio::test]
async fn confirm_advances_reports_and_is_single_shot() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();

    assert!(lifecycle::confirm(engine.db(), &record.id).await.unwrap());
    for report_id in [&lost.id, &found.id] {
        let report = engine.db().get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Matched);
    }

    // Terminal states cannot be re-entered through the lifecycle manager
    assert!(!lifecycle::confirm(engine.db(), &record.id).await.unwrap());
    assert!(!lifecycle::reject(engine.db(), &record.id).await.unwrap());
}

#[tokio::test]
async fn undo_confirmation_walks_both_sides_back() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    lifecycle::confirm(engine.db(), &record.id).await.unwrap();

    assert!(lifecycle::undo_confirmation(engine.db(), &record.id).await.unwrap());
    let reopened = engine.db().get_match_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(reopened.status, MatchStatus::Pending);
}

#[tokio::test]
async fn undo_delivery_keeps_the_match_confirmed() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let found = sample_report(ReportKind::Found, "found bag");
    seed(&engine, &lost).await;
    seed(&engine, &found).await;

    engine.run(&lost.id).await.unwrap();
    lifecycle::mark_delivered(engine.db(), &lost.id).await.unwrap();
    assert!(lifecycle::undo_delivery(engine.db(), &lost.id).await.unwrap());

    for report_id in [&lost.id, &found.id] {
        let report = engine.db().get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Matched);
    }
    let record = engine.db().get_match(&lost.id, &found.id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Confirmed);
}

#[tokio::test]
async fn debug_analysis_ranks_every_candidate() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    let close = sample_report(ReportKind::Found, "found bag");
    let mut far = sample_report(ReportKind::Found, "found umbrella");
    far.description = "long black umbrella with wooden handle".into();
    far.city = Some("Jeddah".into());
    far.latitude = None;
    far.longitude = None;
    seed(&engine, &lost).await;
    seed(&engine, &close).await;
    seed(&engine, &far).await;

    let analysis = engine.debug_candidates(&lost.id).await.unwrap();
    assert_eq!(analysis.candidates.len(), 2);
    assert!(
        analysis.candidates[0].scores.final_score >= analysis.candidates[1].scores.final_score
    );
    assert_eq!(analysis.candidates[0].candidate_id, close.id);

    // Short-id lookup resolves to the same report
    let report = engine.db().get_report(&lost.id).await.unwrap().unwrap();
    let by_short = engine
        .debug_candidates(&report.short_id.to_string())
        .await
        .unwrap();
    assert_eq!(by_short.report_id, lost.id);
}

#[tokio::test]
async fn generic_status_updates_cannot_reach_delivered() {
    let engine = test_engine().await;
    let lost = sample_report(ReportKind::Lost, "lost bag");
    seed(&engine, &lost).await;

    let result = engine
        .db()
        .update_report_status(&lost.id, ReportStatus::Delivered)
        .await;
    assert!(result.is_err());
}
