use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Tunable knobs for the matching engine. Moderators adjust these from the
/// admin UI, so everything here is runtime state, not compile-time constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchSettings {
    /// Relative weight of the image signal in the final score.
    pub weight_image: f64,
    /// Relative weight of the free-text signal.
    pub weight_text: f64,
    /// Relative weight of the location signal.
    pub weight_location: f64,
    /// Relative weight of the recency signal.
    pub weight_time: f64,

    /// Matches scoring below this are not persisted at all.
    pub persist_floor: f64,
    /// Matches reaching this score raise a moderator notification.
    pub notify_threshold: f64,
    /// Ceiling applied to the final score when categories differ.
    pub category_mismatch_cap: f64,

    /// Full location score within this many kilometers.
    pub radius_full_km: f64,
    /// Location score decays to zero at this distance.
    pub radius_max_km: f64,

    /// Days after which the time score bottoms out at `time_floor`.
    pub time_window_days: i64,
    /// The time signal never drops below this (items turn up late).
    pub time_floor: f64,

    /// Only the first N images per report are compared pairwise.
    pub max_images_per_set: usize,

    /// Recipients for "new pending match" and engine-failure notifications.
    pub moderator_user_ids: Vec<String>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            weight_image: 0.40,
            weight_text: 0.30,
            weight_location: 0.20,
            weight_time: 0.10,
            persist_floor: 0.15,
            notify_threshold: 0.60,
            category_mismatch_cap: 0.30,
            radius_full_km: 1.0,
            radius_max_km: 50.0,
            time_window_days: 45,
            time_floor: 0.10,
            max_images_per_set: 3,
            moderator_user_ids: Vec::new(),
        }
    }
}

impl MatchSettings {
    /// Build settings from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            weight_image: env_f64("MATCH_WEIGHT_IMAGE", defaults.weight_image),
            weight_text: env_f64("MATCH_WEIGHT_TEXT", defaults.weight_text),
            weight_location: env_f64("MATCH_WEIGHT_LOCATION", defaults.weight_location),
            weight_time: env_f64("MATCH_WEIGHT_TIME", defaults.weight_time),
            persist_floor: env_f64("MATCH_PERSIST_FLOOR", defaults.persist_floor),
            notify_threshold: env_f64("MATCH_NOTIFY_THRESHOLD", defaults.notify_threshold),
            category_mismatch_cap: env_f64(
                "MATCH_CATEGORY_MISMATCH_CAP",
                defaults.category_mismatch_cap,
            ),
            radius_full_km: env_f64("MATCH_RADIUS_FULL_KM", defaults.radius_full_km),
            radius_max_km: env_f64("MATCH_RADIUS_MAX_KM", defaults.radius_max_km),
            time_window_days: env_i64("MATCH_TIME_WINDOW_DAYS", defaults.time_window_days),
            time_floor: env_f64("MATCH_TIME_FLOOR", defaults.time_floor),
            max_images_per_set: env_i64("MATCH_MAX_IMAGES_PER_SET", 3) as usize,
            moderator_user_ids: env_var_as_vec("MODERATOR_USER_IDS", ','),
        }
    }
}

/// Settings handle shared between the admin API, the worker, and the engine.
pub type SharedSettings = Arc<RwLock<MatchSettings>>;

pub fn shared(settings: MatchSettings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

fn env_f64(var: &str, default: f64) -> f64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Retrieves an environment variable and splits it into a vector of strings
/// based on a delimiter, dropping empty entries.
pub fn env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
