mod core;
mod matches;
mod notification;
mod report;
mod schema;

// Re-export Database and essential traits
pub use self::core::Database;
pub use sqlx::Row;
