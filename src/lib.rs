pub mod app;
pub mod config;
pub mod db;
pub mod engine;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod notify;
pub mod scoring;
pub mod worker;

pub const TARGET_DB: &str = "db_query";
pub const TARGET_ENGINE: &str = "match_engine";
pub const TARGET_SCORING: &str = "scoring";
pub const TARGET_NOTIFY: &str = "notify";
pub const TARGET_WEB_REQUEST: &str = "web_request";
