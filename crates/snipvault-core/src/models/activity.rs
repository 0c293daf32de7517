//! Append-only activity log entries

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::EntityKind;
use crate::error::{Error, Result};

/// What happened to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Save,
    Update,
    Delete,
    /// A capture was rejected as a duplicate
    DuplicateDetected,
    /// A capture was saved despite a duplicate match
    ForceSave,
    /// A queued change was dropped after exhausting retries or failing validation
    SyncDropped,
}

impl ActivityAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DuplicateDetected => "duplicate_detected",
            Self::ForceSave => "force_save",
            Self::SyncDropped => "sync_dropped",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "save" => Ok(Self::Save),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "duplicate_detected" => Ok(Self::DuplicateDetected),
            "force_save" => Ok(Self::ForceSave),
            "sync_dropped" => Ok(Self::SyncDropped),
            other => Err(Error::InvalidInput(format!("unknown activity action `{other}`"))),
        }
    }
}

/// One row of the local activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    /// Assigned by the store on append
    #[serde(default)]
    pub id: i64,
    pub timestamp: i64,
    pub action: ActivityAction,
    pub item_type: EntityKind,
    pub item_id: String,
    pub project_id: Option<String>,
    pub source: Option<String>,
    pub content_hash: Option<String>,
    pub platform: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ActivityLogEntry {
    #[must_use]
    pub fn new(action: ActivityAction, item_type: EntityKind, item_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: crate::util::now_ms(),
            action,
            item_type,
            item_id: item_id.into(),
            project_id: None,
            source: None,
            content_hash: None,
            platform: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach the capture source and the platform derived from it
    #[must_use]
    pub fn with_source(mut self, source: Option<&str>) -> Self {
        self.platform = source.and_then(detect_platform).map(str::to_string);
        self.source = source.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    #[must_use]
    pub fn with_content_hash(mut self, content_hash: Option<&str>) -> Self {
        self.content_hash = content_hash.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

const PLATFORM_HOSTS: &[(&str, &str)] = &[
    ("chatgpt.com", "chatgpt"),
    ("chat.openai.com", "chatgpt"),
    ("claude.ai", "claude"),
    ("gemini.google.com", "gemini"),
    ("copilot.microsoft.com", "copilot"),
    ("github.com/copilot", "copilot"),
    ("perplexity.ai", "perplexity"),
    ("chat.deepseek.com", "deepseek"),
    ("chat.mistral.ai", "mistral"),
    ("poe.com", "poe"),
];

/// Map a capture source URL to the chat platform it came from.
pub fn detect_platform(source: &str) -> Option<&'static str> {
    let lowered = source.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);

    PLATFORM_HOSTS
        .iter()
        .find(|(host, _)| without_www.starts_with(host))
        .map(|(_, platform)| *platform)
}
