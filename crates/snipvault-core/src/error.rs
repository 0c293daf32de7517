//! Error types for snipvault-core

use thiserror::Error;

use crate::sync::TransportError;

/// Result type alias using snipvault-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in snipvault-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The primary storage engine could not be opened
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Payload failed boundary validation (oversized field, bad reference)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sync transport error
    #[error("Sync error: {0}")]
    Transport(#[from] TransportError),

    /// Sync is not configured or has been disabled
    #[error("Sync is disabled: {0}")]
    SyncDisabled(String),
}
