use anyhow::Result;
use clap::Parser;
use prettytable::{Cell, Row as PrettyRow, Table};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use reunite::config::{self, MatchSettings};
use reunite::db::Database;
use reunite::engine::MatchingEngine;

/// Show every opposite-kind candidate for one report with the per-signal
/// score breakdown, best first, including candidates routine matching would
/// skip. Nothing is persisted.
#[derive(Parser)]
#[command(name = "debug_match", about = "Per-signal score breakdown for one report")]
struct Args {
    /// Report UUID or short id
    report: String,

    /// Hide candidates below this final score
    #[arg(long, default_value_t = 0.0)]
    min_score: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set default subscriber");

    let args = Args::parse();

    let db = Database::instance().await.clone();
    let engine = MatchingEngine::new(db, config::shared(MatchSettings::from_env()));

    let analysis = engine.debug_candidates(&args.report).await?;

    println!(
        "Report #{} [{}] \"{}\" ({}, {} candidates)",
        analysis.report_short_id,
        analysis.report_kind,
        analysis.report_title,
        analysis.report_category,
        analysis.candidates.len()
    );
    println!(
        "Weights: image {:.2} / text {:.2} / location {:.2} / time {:.2}, floor {:.2}",
        analysis.settings.weight_image,
        analysis.settings.weight_text,
        analysis.settings.weight_location,
        analysis.settings.weight_time,
        analysis.settings.persist_floor
    );

    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Status"),
        Cell::new("Cat"),
        Cell::new("Image"),
        Cell::new("Text"),
        Cell::new("Loc"),
        Cell::new("Time"),
        Cell::new("Final"),
        Cell::new("Persisted"),
    ]));

    for candidate in &analysis.candidates {
        if candidate.scores.final_score < args.min_score {
            continue;
        }

        let mut title = candidate.candidate_title.clone();
        if title.chars().count() > 32 {
            title = title.chars().take(29).collect::<String>() + "...";
        }

        let image_cell = if candidate.scores.image_available {
            format!("{:.2}", candidate.scores.image_score)
        } else {
            "-".to_string()
        };
        let persisted = if candidate.already_rejected {
            "rejected"
        } else if candidate.passes_floor {
            "yes"
        } else {
            "no"
        };

        table.add_row(PrettyRow::new(vec![
            Cell::new(&candidate.candidate_short_id.to_string()),
            Cell::new(&title),
            Cell::new(candidate.candidate_status.as_str()),
            Cell::new(if candidate.scores.category_match { "ok" } else { "x" }),
            Cell::new(&image_cell),
            Cell::new(&format!("{:.2}", candidate.scores.text_score)),
            Cell::new(&format!("{:.2}", candidate.scores.location_score)),
            Cell::new(&format!("{:.2}", candidate.scores.time_score)),
            Cell::new(&format!("{:.2}", candidate.scores.final_score)),
            Cell::new(persisted),
        ]));
    }

    table.printstd();
    Ok(())
}
