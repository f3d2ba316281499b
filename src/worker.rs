use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::MatchingEngine;
use crate::notify;
use crate::scoring::image;
use crate::TARGET_ENGINE;

/// Work handed to the background matcher. Callers never wait for a job;
/// every job is safe to run zero, one, or multiple times because the match
/// upsert is idempotent.
#[derive(Debug, Clone)]
pub enum MatchJob {
    /// Re-run matching for one report after a create or edit.
    RunReport(String),
    /// Re-scan every open lost/found pair.
    FullScan,
    /// Compute missing visual signatures for a report's images, then re-run
    /// matching since the image signal just improved.
    EnrichImages(String),
}

impl MatchJob {
    fn report_id(&self) -> Option<&str> {
        match self {
            MatchJob::RunReport(id) | MatchJob::EnrichImages(id) => Some(id),
            MatchJob::FullScan => None,
        }
    }
}

/// Cheap cloneable handle for enqueueing jobs from mutation call sites.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<MatchJob>,
}

impl EngineHandle {
    /// Fire-and-forget; the caller returns before the job runs.
    pub fn enqueue(&self, job: MatchJob) {
        if self.sender.send(job).is_err() {
            error!(target: TARGET_ENGINE, "Match worker is gone, dropping job");
        }
    }
}

/// Spawn the single background worker that drains match jobs. Errors inside
/// a job are caught, logged, and raised as a deduplicated moderator alert;
/// they never reach the caller that triggered the job.
pub fn spawn_match_worker(engine: MatchingEngine) -> EngineHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<MatchJob>();

    tokio::spawn(async move {
        info!(target: TARGET_ENGINE, "Match worker started");
        while let Some(job) = receiver.recv().await {
            if let Err(job_error) = handle_job(&engine, &job).await {
                error!(
                    target: TARGET_ENGINE,
                    "Match job {:?} failed: {:#}", job, job_error
                );
                let moderators = engine.settings().read().await.moderator_user_ids.clone();
                notify::alert_engine_failure(
                    engine.db(),
                    &moderators,
                    job.report_id(),
                    &job_error,
                )
                .await;
            }
        }
        info!(target: TARGET_ENGINE, "Match worker stopped");
    });

    EngineHandle { sender }
}

async fn handle_job(engine: &MatchingEngine, job: &MatchJob) -> Result<()> {
    match job {
        MatchJob::RunReport(report_id) => {
            let written = engine.run(report_id).await?;
            info!(
                target: TARGET_ENGINE,
                "Background matching for {} wrote {} rows", report_id, written
            );
        }
        MatchJob::FullScan => {
            engine.run_full_scan().await?;
        }
        MatchJob::EnrichImages(report_id) => {
            enrich_images(engine, report_id).await?;
            engine.run(report_id).await?;
        }
    }
    Ok(())
}

/// Fetch and fingerprint any of the report's images that still lack a visual
/// signature. Per-image failures degrade that image to data-unavailable and
/// the job keeps going.
async fn enrich_images(engine: &MatchingEngine, report_id: &str) -> Result<()> {
    let db = engine.db();
    let pending_urls = db.images_missing_signature(report_id).await?;
    if pending_urls.is_empty() {
        return Ok(());
    }

    let client = reqwest::Client::new();
    let mut enriched = 0;

    for url in &pending_urls {
        let bytes = match image::load_image_bytes(&client, url).await {
            Ok(bytes) => bytes,
            Err(fetch_error) => {
                warn!(
                    target: TARGET_ENGINE,
                    "Skipping unfetchable image {}: {:#}", url, fetch_error
                );
                continue;
            }
        };

        let signature = match image::signature_from_bytes(&bytes) {
            Ok(signature) => signature,
            Err(decode_error) => {
                warn!(
                    target: TARGET_ENGINE,
                    "Skipping unreadable image {}: {:#}", url, decode_error
                );
                continue;
            }
        };

        db.update_image_signature(report_id, url, signature.fingerprint, &signature.histogram)
            .await?;
        enriched += 1;
    }

    info!(
        target: TARGET_ENGINE,
        "Enriched {}/{} images for report {}",
        enriched,
        pending_urls.len(),
        report_id
    );
    Ok(())
}
