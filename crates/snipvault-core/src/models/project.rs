//! Project model

use serde::{Deserialize, Serialize};

use super::{ProjectId, SyncStatus};
use crate::util::now_ms;

/// Name given to the project created on first run.
pub const DEFAULT_PROJECT_NAME: &str = "Default";

/// Root container for snippets and knowledge items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,
    /// Display name
    pub name: String,
    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Push batch in which this row was last written
    #[serde(default)]
    pub sync_version: i64,
    /// Soft delete flag for sync
    #[serde(default)]
    pub is_deleted: bool,
    /// Local sync bookkeeping
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Project {
    /// Create a new project with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            sync_version: 0,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_new() {
        let project = Project::new("Backend");
        assert_eq!(project.name, "Backend");
        assert!(!project.is_deleted);
        assert_eq!(project.created_at, project.updated_at);
        assert_eq!(project.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn test_project_wire_format_is_camel_case() {
        let project = Project::new("Backend").with_description("api work");
        let json = serde_json::to_value(&project).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("syncVersion").is_some());
        assert_eq!(json["description"], "api work");
    }
}
