use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use reunite::config::{self, MatchSettings};
use reunite::db::Database;
use reunite::engine::MatchingEngine;
use reunite::models::ReportKind;

/// Re-score every open lost/found report pair from the command line.
///
/// Reads DATABASE_PATH and the MATCH_* environment variables the service
/// itself uses, so a scan from the shell scores exactly like the running
/// engine.
#[derive(Parser)]
#[command(name = "run_full_scan", about = "Batch re-scan of all open report pairs")]
struct Args {
    /// Drop each report's pending matches before rescoring it
    #[arg(long)]
    rematch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set default subscriber");

    let args = Args::parse();

    let db = Database::instance().await.clone();
    let engine = MatchingEngine::new(db.clone(), config::shared(MatchSettings::from_env()));

    if args.rematch {
        let lost_ids = db.list_open_report_ids(ReportKind::Lost).await?;
        info!("Clearing and rematching {} open lost reports", lost_ids.len());

        let mut processed = 0;
        let mut matches = 0;
        for report_id in &lost_ids {
            processed += 1;
            match engine.clear_and_rematch(report_id, false).await {
                Ok(count) => matches += count,
                Err(error) => info!("Skipping report {}: {:#}", report_id, error),
            }
        }
        info!(
            "Rematch complete: {} reports processed, {} matches written",
            processed, matches
        );
    } else {
        let outcome = engine.run_full_scan().await?;
        info!(
            "Full scan complete: {} reports processed, {} matches written",
            outcome.processed, outcome.matches
        );
    }

    Ok(())
}
