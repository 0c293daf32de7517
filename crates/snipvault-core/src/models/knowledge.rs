//! Knowledge model

use serde::{Deserialize, Serialize};

use super::{KnowledgeId, ProjectId, SyncStatus};
use crate::text::content_hash;
use crate::util::now_ms;

/// A captured question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Knowledge {
    pub id: KnowledgeId,
    pub project_id: ProjectId,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fingerprint of the normalized answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub sync_version: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Knowledge {
    /// Create a new knowledge item; tags are trimmed, lowercased and deduplicated
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        question: impl Into<String>,
        answer: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        let answer = answer.into();
        let now = now_ms();
        Self {
            id: KnowledgeId::new(),
            project_id,
            question: question.into(),
            content_hash: Some(content_hash(&answer)),
            answer,
            source: None,
            tags: normalize_tags(tags),
            created_at: now,
            updated_at: now,
            sync_version: 0,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Recompute the fingerprint after the answer changed
    pub fn refresh_hash(&mut self) {
        self.content_hash = Some(content_hash(&self.answer));
    }
}

/// Trim, lowercase and deduplicate tags, preserving first-seen order.
#[must_use]
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_hash_covers_answer_only() {
        let project = ProjectId::new();
        let first = Knowledge::new(project, "Why?", "Because.", vec![]);
        let second = Knowledge::new(project, "How come?", "  because. ", vec![]);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " Rust ".to_string(),
            "rust".to_string(),
            String::new(),
            "Fix".to_string(),
        ]);
        assert_eq!(tags, vec!["rust", "fix"]);
    }
}
