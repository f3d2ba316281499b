use chrono::NaiveDate;

use crate::config::MatchSettings;
use crate::models::Report;
use crate::scoring::text;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Score when neither side carries enough location data to compare.
const LOCATION_UNKNOWN_SCORE: f64 = 0.4;
/// Score when one city name contains the other ("Cairo" vs "Cairo, Maadi").
const CITY_CONTAINMENT_SCORE: f64 = 0.6;

/// Great-circle distance between two coordinates (haversine).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance decay: full score inside `radius_full_km`, linear falloff to
/// zero at `radius_max_km`.
fn distance_decay(distance_km: f64, settings: &MatchSettings) -> f64 {
    if distance_km <= settings.radius_full_km {
        return 1.0;
    }
    if distance_km >= settings.radius_max_km {
        return 0.0;
    }
    let span = settings.radius_max_km - settings.radius_full_km;
    if span <= 0.0 {
        return 0.0;
    }
    1.0 - (distance_km - settings.radius_full_km) / span
}

fn city_fallback(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = text::normalize(a);
            let b = text::normalize(b);
            if a.is_empty() || b.is_empty() {
                LOCATION_UNKNOWN_SCORE
            } else if a == b {
                1.0
            } else if a.contains(&b) || b.contains(&a) {
                CITY_CONTAINMENT_SCORE
            } else {
                0.0
            }
        }
        _ => LOCATION_UNKNOWN_SCORE,
    }
}

/// Location similarity: coordinate distance when both sides have GPS data,
/// city-name equality otherwise. Missing data is never fatal.
pub fn location_score(a: &Report, b: &Report, settings: &MatchSettings) -> f64 {
    if let (Some(lat1), Some(lng1), Some(lat2), Some(lng2)) =
        (a.latitude, a.longitude, b.latitude, b.longitude)
    {
        distance_decay(haversine_km(lat1, lng1, lat2, lng2), settings)
    } else {
        city_fallback(a.city.as_deref(), b.city.as_deref())
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    // Some callers hand over full timestamps
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Recency similarity: near-simultaneous events score highest, decaying
/// linearly to `time_floor` at `time_window_days`. Items are found long
/// after being lost, so the score never reaches zero.
pub fn time_score(a: &Report, b: &Report, settings: &MatchSettings) -> f64 {
    let (d1, d2) = match (parse_date(&a.occurred_on), parse_date(&b.occurred_on)) {
        (Some(d1), Some(d2)) => (d1, d2),
        _ => return settings.time_floor,
    };

    let days = (d1 - d2).num_days().abs();
    if days <= 1 {
        return 1.0;
    }
    if days >= settings.time_window_days {
        return settings.time_floor;
    }

    let span = (settings.time_window_days - 1) as f64;
    let progress = (days - 1) as f64 / span;
    1.0 - progress * (1.0 - settings.time_floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportKind, ReportStatus};

    fn located(lat: Option<f64>, lng: Option<f64>, city: Option<&str>, date: &str) -> Report {
        Report {
            id: "r".into(),
            short_id: 0,
            user_id: "u".into(),
            kind: ReportKind::Lost,
            title: "t".into(),
            description: "d".into(),
            category: "bags".into(),
            color: None,
            distinguishing_marks: None,
            city: city.map(String::from),
            address: None,
            latitude: lat,
            longitude: lng,
            occurred_on: date.into(),
            status: ReportStatus::Pending,
            images: Vec::new(),
        }
    }

    #[test]
    fn identical_coordinates_score_full() {
        let a = located(Some(24.7136), Some(46.6753), None, "2025-01-01");
        let b = located(Some(24.7136), Some(46.6753), None, "2025-01-01");
        assert_eq!(location_score(&a, &b, &MatchSettings::default()), 1.0);
    }

    #[test]
    fn distance_decay_is_monotone() {
        let settings = MatchSettings::default();
        let base = located(Some(24.0), Some(46.0), None, "2025-01-01");
        let near = located(Some(24.05), Some(46.0), None, "2025-01-01");
        let far = located(Some(24.3), Some(46.0), None, "2025-01-01");
        let very_far = located(Some(30.0), Some(46.0), None, "2025-01-01");

        let s_near = location_score(&base, &near, &settings);
        let s_far = location_score(&base, &far, &settings);
        let s_very_far = location_score(&base, &very_far, &settings);
        assert!(s_near > s_far);
        assert!(s_far > s_very_far);
        assert_eq!(s_very_far, 0.0);
    }

    #[test]
    fn city_fallback_when_coordinates_missing() {
        let settings = MatchSettings::default();
        let a = located(None, None, Some("Riyadh"), "2025-01-01");
        let same = located(None, None, Some("riyadh"), "2025-01-01");
        let contained = located(None, None, Some("Riyadh Al Olaya"), "2025-01-01");
        let other = located(None, None, Some("Jeddah"), "2025-01-01");
        let unknown = located(None, None, None, "2025-01-01");

        assert_eq!(location_score(&a, &same, &settings), 1.0);
        assert_eq!(location_score(&a, &contained, &settings), CITY_CONTAINMENT_SCORE);
        assert_eq!(location_score(&a, &other, &settings), 0.0);
        assert_eq!(location_score(&a, &unknown, &settings), LOCATION_UNKNOWN_SCORE);
    }

    #[test]
    fn time_decay_reaches_floor_not_zero() {
        let settings = MatchSettings::default();
        let a = located(None, None, None, "2025-01-01");
        let same_day = located(None, None, None, "2025-01-01");
        let next_day = located(None, None, None, "2025-01-02");
        let week = located(None, None, None, "2025-01-08");
        let months = located(None, None, None, "2025-06-01");

        assert_eq!(time_score(&a, &same_day, &settings), 1.0);
        assert_eq!(time_score(&a, &next_day, &settings), 1.0);
        let w = time_score(&a, &week, &settings);
        assert!(w < 1.0 && w > settings.time_floor);
        assert_eq!(time_score(&a, &months, &settings), settings.time_floor);
    }

    #[test]
    fn unparseable_date_degrades_to_floor() {
        let settings = MatchSettings::default();
        let a = located(None, None, None, "not a date");
        let b = located(None, None, None, "2025-01-01");
        assert_eq!(time_score(&a, &b, &settings), settings.time_floor);
    }
}
