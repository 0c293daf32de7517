//! snipvault-core - Core library for snipvault
//!
//! Shared models, the local Content Store, duplicate detection, search,
//! editor context matching and the sync client used by every snipvault
//! interface (CLI, API server, capture integrations).

pub mod capture;
pub mod config;
pub mod db;
pub mod duplicate;
pub mod error;
pub mod export;
pub mod matcher;
pub mod models;
pub mod search;
pub mod state;
pub mod store;
pub mod sync;
pub mod text;
pub mod util;

pub use error::{Error, Result};
pub use models::{Knowledge, KnowledgeId, Project, ProjectId, Record, SavedItem, Snippet, SnippetId};
