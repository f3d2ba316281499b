//! Administrative and debug API: the operations the moderation UI and the
//! match-debugging tooling call. Authentication lives in the gateway in
//! front of this service.

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{MatchSettings, SharedSettings};
use crate::engine::{MatchingEngine, ReportAnalysis, ScanOutcome};
use crate::lifecycle;
use crate::models::MatchRecord;
use crate::worker::{EngineHandle, MatchJob};
use crate::TARGET_WEB_REQUEST;

#[derive(Clone)]
pub struct AppState {
    pub engine: MatchingEngine,
    pub settings: SharedSettings,
    pub jobs: EngineHandle,
}

#[derive(Serialize)]
struct MatchCountResponse {
    matches: usize,
}

#[derive(Serialize)]
struct AckResponse {
    ok: bool,
}

#[derive(Serialize)]
struct QueuedResponse {
    queued: bool,
}

#[derive(Deserialize)]
struct ForceQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct PairRequest {
    lost_report_id: String,
    found_report_id: String,
    #[serde(default)]
    force: bool,
}

type ApiError = (StatusCode, String);

fn internal_error(error: anyhow::Error) -> ApiError {
    warn!(target: TARGET_WEB_REQUEST, "Request failed: {:#}", error);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", error))
}

/// Serve the admin API until the process is stopped.
pub async fn admin_api_loop(state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/matching/run/{report_id}", post(run_matching))
        .route("/matching/full-scan", post(full_scan))
        .route("/matching/rematch/{report_id}", post(rematch))
        .route("/matching/pair", post(score_pair))
        .route("/matching/debug/{report_ref}", get(debug_report))
        .route("/matches/{match_id}/confirm", post(confirm_match))
        .route("/matches/{match_id}/reject", post(reject_match))
        .route("/matches/{match_id}/unconfirm", post(unconfirm_match))
        .route("/reports/{report_id}/delivered", post(mark_delivered))
        .route("/reports/{report_id}/undeliver", post(undo_delivery))
        .route("/triggers/report/{report_id}", post(trigger_report))
        .route("/triggers/images/{report_id}", post(trigger_enrichment))
        .route("/settings", get(get_settings).put(update_settings))
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = TcpListener::bind(&addr).await?;
    info!(target: TARGET_WEB_REQUEST, "Admin API listening on http://{}", addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn run_matching(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<MatchCountResponse>, ApiError> {
    let matches = state.engine.run(&report_id).await.map_err(internal_error)?;
    Ok(Json(MatchCountResponse { matches }))
}

async fn full_scan(State(state): State<AppState>) -> Result<Json<ScanOutcome>, ApiError> {
    let outcome = state.engine.run_full_scan().await.map_err(internal_error)?;
    Ok(Json(outcome))
}

async fn rematch(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<MatchCountResponse>, ApiError> {
    let matches = state
        .engine
        .clear_and_rematch(&report_id, query.force)
        .await
        .map_err(internal_error)?;
    Ok(Json(MatchCountResponse { matches }))
}

async fn score_pair(
    State(state): State<AppState>,
    Json(request): Json<PairRequest>,
) -> Result<Json<MatchRecord>, ApiError> {
    let record = state
        .engine
        .score_pair(
            &request.lost_report_id,
            &request.found_report_id,
            request.force,
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(record))
}

async fn debug_report(
    State(state): State<AppState>,
    Path(report_ref): Path<String>,
) -> Result<Json<ReportAnalysis>, ApiError> {
    let analysis = state
        .engine
        .debug_candidates(&report_ref)
        .await
        .map_err(internal_error)?;
    Ok(Json(analysis))
}

async fn confirm_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = lifecycle::confirm(state.engine.db(), &match_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AckResponse { ok }))
}

async fn reject_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = lifecycle::reject(state.engine.db(), &match_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AckResponse { ok }))
}

async fn unconfirm_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = lifecycle::undo_confirmation(state.engine.db(), &match_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AckResponse { ok }))
}

async fn mark_delivered(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = lifecycle::mark_delivered(state.engine.db(), &report_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AckResponse { ok }))
}

async fn undo_delivery(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = lifecycle::undo_delivery(state.engine.db(), &report_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AckResponse { ok }))
}

/// Called by the report service after a create or edit. Returns immediately;
/// the worker picks the job up.
async fn trigger_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> (StatusCode, Json<QueuedResponse>) {
    state.jobs.enqueue(MatchJob::RunReport(report_id));
    (StatusCode::ACCEPTED, Json(QueuedResponse { queued: true }))
}

/// Called after images are uploaded or captioned: fingerprints whatever is
/// missing, then re-runs matching for the report.
async fn trigger_enrichment(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> (StatusCode, Json<QueuedResponse>) {
    state.jobs.enqueue(MatchJob::EnrichImages(report_id));
    (StatusCode::ACCEPTED, Json(QueuedResponse { queued: true }))
}

async fn get_settings(State(state): State<AppState>) -> Json<MatchSettings> {
    Json(state.settings.read().await.clone())
}

async fn update_settings(
    State(state): State<AppState>,
    Json(new_settings): Json<MatchSettings>,
) -> Json<MatchSettings> {
    let mut settings = state.settings.write().await;
    *settings = new_settings;
    info!(target: TARGET_WEB_REQUEST, "Match settings updated: {:?}", *settings);
    Json(settings.clone())
}
