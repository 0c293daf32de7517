//! Closed set of syncable entity kinds and a tagged record wrapper over them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Knowledge, Project, Snippet};
use crate::error::{Error, Result};

/// Local sync bookkeeping for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Written locally, not yet acknowledged by the server
    #[default]
    Pending,
    /// Matches the server copy
    Synced,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            other => Err(Error::InvalidInput(format!("unknown sync status `{other}`"))),
        }
    }
}

/// Kinds of entities kept in the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Snippet,
    Knowledge,
}

impl EntityKind {
    /// All kinds, parents first
    pub const ALL: [Self; 3] = [Self::Project, Self::Snippet, Self::Knowledge];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Snippet => "snippet",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(Self::Project),
            "snippet" => Ok(Self::Snippet),
            "knowledge" => Ok(Self::Knowledge),
            other => Err(Error::InvalidInput(format!("unknown entity kind `{other}`"))),
        }
    }
}

/// A record of any entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Record {
    Project(Project),
    Snippet(Snippet),
    Knowledge(Knowledge),
}

impl Record {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Project(_) => EntityKind::Project,
            Self::Snippet(_) => EntityKind::Snippet,
            Self::Knowledge(_) => EntityKind::Knowledge,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::Project(project) => project.id.as_str(),
            Self::Snippet(snippet) => snippet.id.as_str(),
            Self::Knowledge(knowledge) => knowledge.id.as_str(),
        }
    }

    /// Owning project, `None` for projects themselves
    pub fn project_id(&self) -> Option<String> {
        match self {
            Self::Project(_) => None,
            Self::Snippet(snippet) => Some(snippet.project_id.as_str()),
            Self::Knowledge(knowledge) => Some(knowledge.project_id.as_str()),
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Project(_) => None,
            Self::Snippet(snippet) => snippet.content_hash.as_deref(),
            Self::Knowledge(knowledge) => knowledge.content_hash.as_deref(),
        }
    }

    pub const fn created_at(&self) -> i64 {
        match self {
            Self::Project(project) => project.created_at,
            Self::Snippet(snippet) => snippet.created_at,
            Self::Knowledge(knowledge) => knowledge.created_at,
        }
    }

    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::Project(project) => project.updated_at,
            Self::Snippet(snippet) => snippet.updated_at,
            Self::Knowledge(knowledge) => knowledge.updated_at,
        }
    }

    pub const fn sync_version(&self) -> i64 {
        match self {
            Self::Project(project) => project.sync_version,
            Self::Snippet(snippet) => snippet.sync_version,
            Self::Knowledge(knowledge) => knowledge.sync_version,
        }
    }

    pub const fn sync_status(&self) -> SyncStatus {
        match self {
            Self::Project(project) => project.sync_status,
            Self::Snippet(snippet) => snippet.sync_status,
            Self::Knowledge(knowledge) => knowledge.sync_status,
        }
    }

    pub const fn is_deleted(&self) -> bool {
        match self {
            Self::Project(project) => project.is_deleted,
            Self::Snippet(snippet) => snippet.is_deleted,
            Self::Knowledge(knowledge) => knowledge.is_deleted,
        }
    }

    /// Stamp a local mutation: `updatedAt = now`, status pending.
    pub fn touch(&mut self, now: i64) {
        let (updated_at, status) = self.stamps_mut();
        *updated_at = now;
        *status = SyncStatus::Pending;
    }

    /// Mark as soft-deleted at `now`.
    pub fn mark_deleted(&mut self, now: i64) {
        match self {
            Self::Project(project) => project.is_deleted = true,
            Self::Snippet(snippet) => snippet.is_deleted = true,
            Self::Knowledge(knowledge) => knowledge.is_deleted = true,
        }
        self.touch(now);
    }

    /// Record that the server acknowledged this row under `version`.
    pub fn mark_synced(&mut self, version: i64) {
        match self {
            Self::Project(project) => project.sync_version = version,
            Self::Snippet(snippet) => snippet.sync_version = version,
            Self::Knowledge(knowledge) => knowledge.sync_version = version,
        }
        let (_, status) = self.stamps_mut();
        *status = SyncStatus::Synced;
    }

    fn stamps_mut(&mut self) -> (&mut i64, &mut SyncStatus) {
        match self {
            Self::Project(project) => (&mut project.updated_at, &mut project.sync_status),
            Self::Snippet(snippet) => (&mut snippet.updated_at, &mut snippet.sync_status),
            Self::Knowledge(knowledge) => (&mut knowledge.updated_at, &mut knowledge.sync_status),
        }
    }

    /// The snippet or knowledge item, if this record is one
    pub fn into_saved_item(self) -> Option<SavedItem> {
        match self {
            Self::Project(_) => None,
            Self::Snippet(snippet) => Some(SavedItem::Snippet(snippet)),
            Self::Knowledge(knowledge) => Some(SavedItem::Knowledge(knowledge)),
        }
    }
}

impl From<Project> for Record {
    fn from(value: Project) -> Self {
        Self::Project(value)
    }
}

impl From<Snippet> for Record {
    fn from(value: Snippet) -> Self {
        Self::Snippet(value)
    }
}

impl From<Knowledge> for Record {
    fn from(value: Knowledge) -> Self {
        Self::Knowledge(value)
    }
}

/// A user-facing saved item: what search and context matching return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "lowercase")]
pub enum SavedItem {
    Snippet(Snippet),
    Knowledge(Knowledge),
}

impl SavedItem {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Snippet(_) => EntityKind::Snippet,
            Self::Knowledge(_) => EntityKind::Knowledge,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::Snippet(snippet) => snippet.id.as_str(),
            Self::Knowledge(knowledge) => knowledge.id.as_str(),
        }
    }

    pub const fn created_at(&self) -> i64 {
        match self {
            Self::Snippet(snippet) => snippet.created_at,
            Self::Knowledge(knowledge) => knowledge.created_at,
        }
    }

    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::Snippet(snippet) => snippet.updated_at,
            Self::Knowledge(knowledge) => knowledge.updated_at,
        }
    }

    /// One-line label for listings
    pub fn title(&self, max_len: usize) -> String {
        match self {
            Self::Snippet(snippet) => snippet.title_preview(max_len),
            Self::Knowledge(knowledge) => knowledge.question.trim().chars().take(max_len).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectId;

    #[test]
    fn record_serializes_with_kind_tag() {
        let record = Record::from(Project::new("Inbox"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "project");
        assert_eq!(json["data"]["name"], "Inbox");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn mark_deleted_touches_and_resets_status() {
        let mut record = Record::from(Snippet::new(ProjectId::new(), "x", "text"));
        record.mark_synced(4);
        assert_eq!(record.sync_status(), SyncStatus::Synced);
        assert_eq!(record.sync_version(), 4);

        record.mark_deleted(99);
        assert!(record.is_deleted());
        assert_eq!(record.updated_at(), 99);
        assert_eq!(record.sync_status(), SyncStatus::Pending);
    }

    #[test]
    fn entity_kind_parses_from_label() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("notes".parse::<EntityKind>().is_err());
    }
}
