//! `SQLite` database layer for snipvault

mod activity_repository;
mod connection;
mod migrations;
mod queue_repository;
mod repository;
mod settings_repository;

pub use activity_repository::SqliteActivityRepository;
pub use connection::Database;
pub use queue_repository::SqliteQueueRepository;
pub use repository::SqliteRecordRepository;
pub use settings_repository::SqliteSettingsRepository;
