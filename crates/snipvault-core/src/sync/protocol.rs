//! Wire types for `POST /sync/push` and `GET /sync/pull`.
//!
//! Shared by the client engine and the API server so both sides agree on
//! field names (camelCase JSON) and limits.

use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, Knowledge, Project, Record, Snippet};

/// Maximum items per entity type in one push
pub const MAX_CHANGES_PER_TYPE: usize = 500;
/// Maximum snippet code length, in characters
pub const MAX_CODE_CHARS: usize = 100_000;
/// Maximum knowledge answer length, in characters
pub const MAX_ANSWER_CHARS: usize = 50_000;

/// Records grouped by entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeSet {
    pub projects: Vec<Project>,
    pub snippets: Vec<Snippet>,
    pub knowledge: Vec<Knowledge>,
}

impl ChangeSet {
    pub fn push(&mut self, record: Record) {
        match record {
            Record::Project(project) => self.projects.push(project),
            Record::Snippet(snippet) => self.snippets.push(snippet),
            Record::Knowledge(knowledge) => self.knowledge.push(knowledge),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Project => self.projects.len(),
            EntityKind::Snippet => self.snippets.len(),
            EntityKind::Knowledge => self.knowledge.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len() + self.snippets.len() + self.knowledge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in dependency order: projects first
    pub fn into_records(self) -> Vec<Record> {
        self.projects
            .into_iter()
            .map(Record::from)
            .chain(self.snippets.into_iter().map(Record::from))
            .chain(self.knowledge.into_iter().map(Record::from))
            .collect()
    }

    /// Check batch-level limits
    pub fn validate(&self) -> Result<(), String> {
        for kind in EntityKind::ALL {
            let count = self.count(kind);
            if count > MAX_CHANGES_PER_TYPE {
                return Err(format!(
                    "too many {kind} changes: {count} (max {MAX_CHANGES_PER_TYPE})"
                ));
            }
        }
        self.projects
            .iter()
            .cloned()
            .map(Record::from)
            .chain(self.snippets.iter().cloned().map(Record::from))
            .chain(self.knowledge.iter().cloned().map(Record::from))
            .try_for_each(|record| validate_record(&record))
    }
}

/// Field-level limits for one record
pub fn validate_record(record: &Record) -> Result<(), String> {
    if record.id().trim().is_empty() {
        return Err(format!("{} id must not be empty", record.kind()));
    }
    match record {
        Record::Project(project) => {
            if project.name.trim().is_empty() {
                return Err(format!("project {} has an empty name", project.id));
            }
        }
        Record::Snippet(snippet) => {
            let chars = snippet.code.chars().count();
            if chars > MAX_CODE_CHARS {
                return Err(format!(
                    "snippet {} code is {chars} characters (max {MAX_CODE_CHARS})",
                    snippet.id
                ));
            }
        }
        Record::Knowledge(knowledge) => {
            let chars = knowledge.answer.chars().count();
            if chars > MAX_ANSWER_CHARS {
                return Err(format!(
                    "knowledge {} answer is {chars} characters (max {MAX_ANSWER_CHARS})",
                    knowledge.id
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    #[serde(default)]
    pub last_sync_version: i64,
    #[serde(default)]
    pub changes: ChangeSet,
}

impl PushRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id.trim().is_empty() {
            return Err("deviceId must not be empty".to_string());
        }
        self.changes.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub sync_version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullQuery {
    #[serde(default)]
    pub since: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub sync_version: i64,
    pub changes: ChangeSet,
}

/// JSON body of every non-2xx response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectId;

    #[test]
    fn test_push_request_wire_shape() {
        let project = Project::new("P");
        let mut changes = ChangeSet::default();
        changes.push(project.clone().into());
        changes.push(Snippet::new(project.id, "x", "text").into());

        let request = PushRequest {
            device_id: "device-1".to_string(),
            last_sync_version: 3,
            changes,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["deviceId"], "device-1");
        assert_eq!(json["lastSyncVersion"], 3);
        assert_eq!(json["changes"]["snippets"][0]["projectId"], project.id.as_str());
        assert!(json["changes"]["knowledge"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_missing_change_arrays_default_to_empty() {
        let request: PushRequest =
            serde_json::from_str(r#"{"deviceId":"d","changes":{"projects":[]}}"#).unwrap();
        assert!(request.changes.is_empty());
        assert_eq!(request.last_sync_version, 0);
    }

    #[test]
    fn test_validate_rejects_oversized_fields() {
        let project = ProjectId::new();
        let snippet = Snippet::new(project, "x".repeat(MAX_CODE_CHARS + 1), "text");
        assert!(validate_record(&snippet.into()).is_err());

        let knowledge = Knowledge::new(project, "q", "a".repeat(MAX_ANSWER_CHARS), vec![]);
        assert!(validate_record(&knowledge.into()).is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_batches() {
        let mut changes = ChangeSet::default();
        for _ in 0..=MAX_CHANGES_PER_TYPE {
            changes.push(Project::new("p").into());
        }
        let request = PushRequest {
            device_id: "d".to_string(),
            last_sync_version: 0,
            changes,
        };
        assert!(request.validate().unwrap_err().contains("project"));
    }

    #[test]
    fn test_empty_device_id_rejected() {
        let request = PushRequest {
            device_id: "  ".to_string(),
            last_sync_version: 0,
            changes: ChangeSet::default(),
        };
        assert!(request.validate().is_err());
    }
}
