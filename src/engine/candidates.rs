use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use crate::db::Database;
use crate::models::Report;
use crate::TARGET_ENGINE;

/// Enumerate the reports eligible for scoring against `report`: opposite
/// kind, still open, and not already rejected against it by a moderator.
/// Callers may re-invoke at any time; the result reflects current store
/// state, not a snapshot.
pub async fn candidates_for(db: &Database, report: &Report) -> Result<Vec<Report>> {
    let rejected: HashSet<String> = db
        .rejected_counterpart_ids(&report.id)
        .await?
        .into_iter()
        .collect();

    let open = db
        .list_open_reports(report.kind.opposite(), &report.id)
        .await?;

    let candidates: Vec<Report> = open
        .into_iter()
        .filter(|candidate| !rejected.contains(&candidate.id))
        .collect();

    debug!(
        target: TARGET_ENGINE,
        "Report {} has {} candidates ({} rejected pairs skipped)",
        report.short_id,
        candidates.len(),
        rejected.len()
    );

    Ok(candidates)
}
