pub mod geo;
pub mod image;
pub mod text;

use serde::{Deserialize, Serialize};

use crate::config::MatchSettings;
use crate::models::Report;

/// Per-signal scores for one report pair, all in [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub image_score: f64,
    pub text_score: f64,
    pub location_score: f64,
    pub time_score: f64,
    pub final_score: f64,
    pub category_match: bool,
    /// False when either report has no comparable images; the image weight
    /// is then redistributed over the remaining signals.
    pub image_available: bool,
}

/// Combine the four signals into one confidence score. Pure and
/// deterministic: identical inputs always produce identical output, which is
/// what makes recomputation idempotent.
pub fn score_reports(a: &Report, b: &Report, settings: &MatchSettings) -> ScoreBreakdown {
    let attrs = text::compare_attributes(a, b);
    let image = image::compare_image_sets(&a.images, &b.images, settings.max_images_per_set);
    let location_score = geo::location_score(a, b, settings);
    let time_score = geo::time_score(a, b, settings);

    let image_available = image.is_some();
    let image_score = image.unwrap_or(0.0);

    let mut weight_sum = settings.weight_text + settings.weight_location + settings.weight_time;
    let mut total = attrs.text_score * settings.weight_text
        + location_score * settings.weight_location
        + time_score * settings.weight_time;
    if image_available {
        weight_sum += settings.weight_image;
        total += image_score * settings.weight_image;
    }

    let mut final_score = if weight_sum > 0.0 { total / weight_sum } else { 0.0 };

    // A visually similar item of a different category must never rank as a
    // strong match.
    if !attrs.category_match {
        final_score = final_score.min(settings.category_mismatch_cap);
    }

    ScoreBreakdown {
        image_score,
        text_score: attrs.text_score,
        location_score,
        time_score,
        final_score: final_score.clamp(0.0, 1.0),
        category_match: attrs.category_match,
        image_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportKind, ReportStatus};

    fn report(kind: ReportKind, category: &str, title: &str) -> Report {
        Report {
            id: format!("{}-{}", kind, title),
            short_id: 0,
            user_id: "u1".into(),
            kind,
            title: title.into(),
            description: "left on the back seat of a taxi".into(),
            category: category.into(),
            color: None,
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

    #[test]
    fn matching_pair_without_images_scores_high() {
        let lost = report(ReportKind::Lost, "bags", "black leather laptop bag");
        let mut found = report(ReportKind::Found, "bags", "black leather laptop bag");
        found.occurred_on = "2025-03-11".into();

        let settings = MatchSettings::default();
        let b = score_reports(&lost, &found, &settings);

        assert!(!b.image_available);
        assert!(b.text_score > 0.8, "text_score = {}", b.text_score);
        assert!(b.location_score > 0.9, "location_score = {}", b.location_score);
        assert!(b.time_score > 0.8, "time_score = {}", b.time_score);
        assert!(b.final_score > 0.7, "final_score = {}", b.final_score);
    }

    #[test]
    fn category_mismatch_caps_final_score() {
        let lost = report(ReportKind::Lost, "bags", "black leather laptop bag");
        let found = report(ReportKind::Found, "electronics", "black leather laptop bag");

        let settings = MatchSettings::default();
        let b = score_reports(&lost, &found, &settings);

        assert!(!b.category_match);
        assert!(b.final_score <= settings.category_mismatch_cap);
    }

    #[test]
    fn other_category_is_not_a_mismatch() {
        let lost = report(ReportKind::Lost, "other", "black leather laptop bag");
        let found = report(ReportKind::Found, "electronics", "black leather laptop bag");

        let b = score_reports(&lost, &found, &MatchSettings::default());
        assert!(b.category_match);
    }

    #[test]
    fn all_scores_stay_in_range() {
        let lost = report(ReportKind::Lost, "bags", "x");
        let mut found = report(ReportKind::Found, "bags", "completely unrelated umbrella");
        found.latitude = None;
        found.longitude = None;
        found.city = None;
        found.occurred_on = "2019-01-01".into();

        let b = score_reports(&lost, &found, &MatchSettings::default());
        for score in [
            b.image_score,
            b.text_score,
            b.location_score,
            b.time_score,
            b.final_score,
        ] {
            assert!((0.0..=1.0).contains(&score), "out of range: {}", score);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let lost = report(ReportKind::Lost, "bags", "black leather laptop bag");
        let found = report(ReportKind::Found, "bags", "dark leather bag");

        let settings = MatchSettings::default();
        let first = score_reports(&lost, &found, &settings);
        for _ in 0..5 {
            let again = score_reports(&lost, &found, &settings);
            assert_eq!(first.final_score, again.final_score);
            assert_eq!(first.text_score, again.text_score);
        }
    }

    #[test]
    fn weights_renormalize_when_image_signal_missing() {
        // Text, location and time all at 1.0 must yield 1.0 even though the
        // image weight contributes nothing.
        let lost = report(ReportKind::Lost, "bags", "black leather laptop bag");
        let found = report(ReportKind::Found, "bags", "black leather laptop bag");

        let b = score_reports(&lost, &found, &MatchSettings::default());
        assert!(b.final_score > 0.95, "final_score = {}", b.final_score);
    }
}
