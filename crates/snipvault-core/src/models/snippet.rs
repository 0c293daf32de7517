//! Snippet model

use serde::{Deserialize, Serialize};

use super::{ProjectId, SnippetId, SyncStatus};
use crate::text::content_hash;
use crate::util::now_ms;

/// A captured piece of code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Unique identifier
    pub id: SnippetId,
    /// Owning project
    pub project_id: ProjectId,
    /// Code as captured
    pub code: String,
    /// Language label as reported by the capture source
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Page the snippet was captured from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Fingerprint of the normalized code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    #[serde(default)]
    pub sync_version: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Snippet {
    /// Create a new snippet, fingerprinting its code
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        code: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let now = now_ms();
        Self {
            id: SnippetId::new(),
            project_id,
            content_hash: Some(content_hash(&code)),
            code,
            language: language.into(),
            description: None,
            source: None,
            created_at: now,
            updated_at: now,
            sync_version: 0,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Recompute the fingerprint after the code changed
    pub fn refresh_hash(&mut self) {
        self.content_hash = Some(content_hash(&self.code));
    }

    /// Get first line of code as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.description
            .as_deref()
            .unwrap_or_else(|| self.code.lines().find(|line| !line.trim().is_empty()).unwrap_or(""))
            .trim()
            .chars()
            .take(max_len)
            .collect()
    }
}
