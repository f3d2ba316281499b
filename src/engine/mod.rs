pub mod candidates;

#[cfg(test)]
mod tests;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MatchSettings, SharedSettings};
use crate::db::Database;
use crate::models::{MatchRecord, MatchStatus, Report, ReportKind, ReportStatus};
use crate::notify;
use crate::scoring::{self, ScoreBreakdown};
use crate::TARGET_ENGINE;

/// Aggregate counts returned by a batch scan, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub processed: usize,
    pub matches: usize,
}

/// One scored candidate in a debug analysis.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub candidate_id: String,
    pub candidate_short_id: i64,
    pub candidate_title: String,
    pub candidate_status: ReportStatus,
    pub already_rejected: bool,
    pub scores: ScoreBreakdown,
    pub passes_floor: bool,
}

/// Full ranked candidate list for one report, with per-signal breakdowns.
/// Consumed by the match-debugging tooling.
#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalysis {
    pub report_id: String,
    pub report_short_id: i64,
    pub report_title: String,
    pub report_kind: ReportKind,
    pub report_category: String,
    pub settings: MatchSettings,
    pub candidates: Vec<CandidateScore>,
}

/// The orchestrator: computes and upserts match rows for one report, one
/// pair, or the whole system. Every operation is idempotent; the match
/// table's pair-key constraint is the sole concurrency guard.
#[derive(Clone)]
pub struct MatchingEngine {
    db: Database,
    settings: SharedSettings,
}

impl MatchingEngine {
    pub fn new(db: Database, settings: SharedSettings) -> Self {
        Self { db, settings }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Incremental pass: score every candidate against one report and
    /// persist whatever clears the floor. Returns the number of rows
    /// created or refreshed.
    pub async fn run(&self, report_id: &str) -> Result<usize> {
        let settings = self.settings.read().await.clone();
        let report = self
            .db
            .get_report(report_id)
            .await?
            .ok_or_else(|| anyhow!("Report not found: {}", report_id))?;

        self.run_for_report(&report, &settings).await
    }

    async fn run_for_report(&self, report: &Report, settings: &MatchSettings) -> Result<usize> {
        if !report.status.is_open() {
            debug!(
                target: TARGET_ENGINE,
                "Report {} is {}, nothing to match", report.short_id, report.status
            );
            return Ok(0);
        }

        let candidates = candidates::candidates_for(&self.db, report).await?;
        let mut written = 0;

        for candidate in &candidates {
            let (lost, found) = orient(report, candidate);
            let breakdown = scoring::score_reports(lost, found, settings);

            if breakdown.final_score < settings.persist_floor {
                continue;
            }

            match self.db.upsert_match(&lost.id, &found.id, &breakdown).await? {
                Some(record) => {
                    written += 1;
                    if record.final_score >= settings.notify_threshold {
                        notify::notify_moderators_of_match(
                            &self.db,
                            &settings.moderator_user_ids,
                            &record,
                            &lost.title,
                            &found.title,
                        )
                        .await;
                    }
                }
                None => {
                    // Terminal row; a routine pass never touches it
                    debug!(
                        target: TARGET_ENGINE,
                        "Pair ({}, {}) already decided, skipping",
                        lost.short_id,
                        found.short_id
                    );
                }
            }
        }

        // First matches move a fresh report into review
        if written > 0 && report.status == ReportStatus::Pending {
            self.db
                .update_report_status(&report.id, ReportStatus::Processing)
                .await?;
        }

        info!(
            target: TARGET_ENGINE,
            "Matching for report {} complete: {} of {} candidates persisted",
            report.short_id,
            written,
            candidates.len()
        );
        Ok(written)
    }

    /// Batch pass over every open lost × found pair. Per-report failures are
    /// logged and skipped so one bad record cannot stall the scan.
    pub async fn run_full_scan(&self) -> Result<ScanOutcome> {
        let lost_ids = self.db.list_open_report_ids(ReportKind::Lost).await?;
        let mut outcome = ScanOutcome {
            processed: 0,
            matches: 0,
        };

        info!(
            target: TARGET_ENGINE,
            "Full scan started over {} open lost reports",
            lost_ids.len()
        );

        for report_id in &lost_ids {
            outcome.processed += 1;
            match self.run(report_id).await {
                Ok(count) => outcome.matches += count,
                Err(error) => {
                    warn!(
                        target: TARGET_ENGINE,
                        "Full scan skipping report {}: {:#}", report_id, error
                    );
                }
            }
        }

        info!(
            target: TARGET_ENGINE,
            "Full scan complete: {} reports processed, {} matches written",
            outcome.processed,
            outcome.matches
        );
        Ok(outcome)
    }

    /// Drop this report's pending rows and rebuild them from scratch.
    /// Terminal rows survive unless `force` is set.
    pub async fn clear_and_rematch(&self, report_id: &str, force: bool) -> Result<usize> {
        let cleared = self.db.delete_matches_for_report(report_id, force).await?;
        debug!(
            target: TARGET_ENGINE,
            "Cleared {} match rows for report {} (force: {})", cleared, report_id, force
        );
        self.run(report_id).await
    }

    /// Score exactly one pair and persist it regardless of the floor. Scores
    /// on a terminal row are refreshed but its status stands; `force`
    /// additionally resets the row to pending for re-review.
    pub async fn score_pair(
        &self,
        lost_id: &str,
        found_id: &str,
        force: bool,
    ) -> Result<MatchRecord> {
        let settings = self.settings.read().await.clone();

        let lost = self
            .db
            .get_report(lost_id)
            .await?
            .ok_or_else(|| anyhow!("Report not found: {}", lost_id))?;
        let found = self
            .db
            .get_report(found_id)
            .await?
            .ok_or_else(|| anyhow!("Report not found: {}", found_id))?;

        if lost.kind != ReportKind::Lost || found.kind != ReportKind::Found {
            bail!(
                "score_pair expects (lost, found), got ({}, {})",
                lost.kind,
                found.kind
            );
        }

        let breakdown = scoring::score_reports(&lost, &found, &settings);
        let record = self
            .db
            .force_upsert_match(&lost.id, &found.id, &breakdown, force)
            .await?;

        if record.status == MatchStatus::Pending
            && record.final_score >= settings.notify_threshold
        {
            notify::notify_moderators_of_match(
                &self.db,
                &settings.moderator_user_ids,
                &record,
                &lost.title,
                &found.title,
            )
            .await;
        }

        Ok(record)
    }

    /// Score every opposite-kind report against one report without
    /// persisting anything, ranked best first. Accepts a UUID or a short id.
    pub async fn debug_candidates(&self, report_ref: &str) -> Result<ReportAnalysis> {
        let settings = self.settings.read().await.clone();
        let report = self.resolve_report(report_ref).await?;

        let rejected: std::collections::HashSet<String> = self
            .db
            .rejected_counterpart_ids(&report.id)
            .await?
            .into_iter()
            .collect();

        let others = self
            .db
            .list_reports_of_kind(report.kind.opposite(), &report.id)
            .await?;

        let mut candidates: Vec<CandidateScore> = others
            .iter()
            .map(|candidate| {
                let (lost, found) = orient(&report, candidate);
                let scores = scoring::score_reports(lost, found, &settings);
                CandidateScore {
                    candidate_id: candidate.id.clone(),
                    candidate_short_id: candidate.short_id,
                    candidate_title: candidate.title.clone(),
                    candidate_status: candidate.status,
                    already_rejected: rejected.contains(&candidate.id),
                    passes_floor: scores.final_score >= settings.persist_floor,
                    scores,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.scores
                .final_score
                .partial_cmp(&a.scores.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(ReportAnalysis {
            report_id: report.id.clone(),
            report_short_id: report.short_id,
            report_title: report.title.clone(),
            report_kind: report.kind,
            report_category: report.category.clone(),
            settings,
            candidates,
        })
    }

    async fn resolve_report(&self, report_ref: &str) -> Result<Report> {
        // Support staff work with short ids; everything else uses the UUID
        let looked_up = if !report_ref.contains('-') {
            match report_ref.parse::<i64>() {
                Ok(short_id) => self.db.get_report_by_short_id(short_id).await?,
                Err(_) => self.db.get_report(report_ref).await?,
            }
        } else {
            self.db.get_report(report_ref).await?
        };

        looked_up.ok_or_else(|| anyhow!("Report not found: {}", report_ref))
    }
}

/// Order a (report, candidate) pair as (lost, found).
fn orient<'a>(report: &'a Report, candidate: &'a Report) -> (&'a Report, &'a Report) {
    if report.kind == ReportKind::Lost {
        (report, candidate)
    } else {
        (candidate, report)
    }
}
