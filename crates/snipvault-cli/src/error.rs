use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] snipvault_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No content provided")]
    EmptyContent,
    #[error("Edited content cannot be empty")]
    EmptyEditedContent,
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("No {0} found for id/prefix: {1}")]
    NotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Invalid editor context: {0}")]
    InvalidContext(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// A capture, edit or delete was refused; the message is already user-facing
    #[error("{0}")]
    Rejected(String),
    #[error(
        "Sync is not configured. Run `snipvault config set-api-url <URL>` and \
         `snipvault config set-token <TOKEN>`, or set SNIPVAULT_API_URL and SNIPVAULT_TOKEN."
    )]
    SyncNotConfigured,
}
