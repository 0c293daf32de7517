//! Data models for snipvault

mod activity;
mod id;
mod knowledge;
mod project;
mod record;
mod settings;
mod snippet;
mod sync;

pub use activity::{detect_platform, ActivityAction, ActivityLogEntry};
pub use id::{KnowledgeId, ProjectId, SnippetId};
pub use knowledge::{normalize_tags, Knowledge};
pub use project::{Project, DEFAULT_PROJECT_NAME};
pub use record::{EntityKind, Record, SavedItem, SyncStatus};
pub use settings::{Settings, DEFAULT_AUTO_SYNC_INTERVAL_SECS};
pub use snippet::Snippet;
pub use sync::{QueueOperation, SyncQueueItem, SyncSession};
