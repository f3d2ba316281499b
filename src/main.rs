use anyhow::Result;

use reunite::app::{admin_api_loop, AppState};
use reunite::config::{self, MatchSettings};
use reunite::db::Database;
use reunite::engine::MatchingEngine;
use reunite::logging::configure_logging;
use reunite::worker::spawn_match_worker;

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let settings = config::shared(MatchSettings::from_env());
    let db = Database::instance().await.clone();

    let engine = MatchingEngine::new(db, settings.clone());
    let jobs = spawn_match_worker(engine.clone());

    let state = AppState {
        engine,
        settings,
        jobs,
    };

    admin_api_loop(state).await
}
