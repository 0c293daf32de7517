//! Capture boundary: turns raw captures and edits into stored records.
//!
//! Every operation returns a [`CaptureResult`]; failures are reported in the
//! result instead of propagating, and a rejected capture writes nothing.

use serde::{Deserialize, Serialize};

use crate::duplicate::{check_knowledge, check_snippet, DuplicateCheck, MatchType};
use crate::error::{Error, Result};
use crate::models::{
    normalize_tags, ActivityAction, ActivityLogEntry, EntityKind, Knowledge, KnowledgeId, Project,
    ProjectId, SavedItem, Snippet, SnippetId,
};
use crate::store::ContentStore;
use crate::sync::protocol::{MAX_ANSWER_CHARS, MAX_CODE_CHARS};
use crate::util::normalize_text_option;

const DEFAULT_LANGUAGE: &str = "text";
const TITLE_CHARS: usize = 80;

/// A code capture from a chat page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetCapture {
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Target project; the default project when absent
    #[serde(default)]
    pub project_id: Option<String>,
    /// Save even when a duplicate exists
    #[serde(default)]
    pub force: bool,
}

/// A question/answer capture from a chat page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeCapture {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Fields to change on an existing snippet; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetEdit {
    pub code: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEdit {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Enough about a matched item for the caller to decide on a force-save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingItemSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub title: String,
    pub saved_at: i64,
}

impl From<&SavedItem> for ExistingItemSummary {
    fn from(item: &SavedItem) -> Self {
        Self {
            id: item.id(),
            kind: item.kind(),
            title: item.title(TITLE_CHARS),
            saved_at: item.created_at(),
        }
    }
}

/// Outcome of a capture, edit or delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_item: Option<ExistingItemSummary>,
}

impl CaptureResult {
    pub fn saved(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn duplicate(check: &DuplicateCheck) -> Self {
        let error = match check.match_type {
            Some(MatchType::Exact) => "An identical item is already saved".to_string(),
            _ => format!(
                "A similar item is already saved ({}% match)",
                check.similarity.unwrap_or_default()
            ),
        };
        Self {
            success: false,
            error: Some(error),
            is_duplicate: Some(true),
            match_type: check.match_type,
            similarity: check.similarity,
            existing_item: check.existing_item.as_ref().map(ExistingItemSummary::from),
            ..Self::default()
        }
    }
}

/// Validating, duplicate-aware writes on top of a [`ContentStore`]
#[derive(Debug, Clone)]
pub struct CaptureService {
    store: ContentStore,
}

impl CaptureService {
    pub const fn new(store: ContentStore) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    pub async fn capture_snippet(&self, capture: SnippetCapture) -> CaptureResult {
        into_result(self.try_capture_snippet(capture).await)
    }

    pub async fn capture_knowledge(&self, capture: KnowledgeCapture) -> CaptureResult {
        into_result(self.try_capture_knowledge(capture).await)
    }

    pub async fn create_project(&self, name: &str, description: Option<String>) -> CaptureResult {
        into_result(self.try_create_project(name, description).await)
    }

    pub async fn edit_snippet(&self, id: &str, edit: SnippetEdit) -> CaptureResult {
        into_result(self.try_edit_snippet(id, edit).await)
    }

    pub async fn edit_knowledge(&self, id: &str, edit: KnowledgeEdit) -> CaptureResult {
        into_result(self.try_edit_knowledge(id, edit).await)
    }

    /// Soft-delete an item; a project takes its snippets and knowledge with it.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> CaptureResult {
        into_result(self.try_delete(kind, id).await)
    }

    async fn try_capture_snippet(&self, capture: SnippetCapture) -> Result<CaptureResult> {
        let code = validate_code(&capture.code)?;
        let project = self.resolve_project(capture.project_id.as_deref()).await?;

        let existing = self.store.list_snippets(Some(&project.id)).await?;
        let check = check_snippet(&code, &existing);
        let screened = self
            .screen(&check, capture.force, EntityKind::Snippet, capture.source.as_deref())
            .await?;
        let Some(action) = screened else {
            return Ok(CaptureResult::duplicate(&check));
        };

        let mut snippet = Snippet::new(project.id, code, language_or_default(capture.language));
        snippet.description = normalize_text_option(capture.description);
        snippet.source = normalize_text_option(capture.source);
        let snippet = self.store.put_snippet(snippet).await?;

        self.log(
            ActivityLogEntry::new(action, EntityKind::Snippet, snippet.id.as_str())
                .with_project(Some(project.id.as_str()))
                .with_source(snippet.source.as_deref())
                .with_content_hash(snippet.content_hash.as_deref())
                .with_metadata(duplicate_metadata(&check)),
        )
        .await;
        tracing::debug!("Captured snippet {}", snippet.id);
        Ok(CaptureResult::saved(snippet.id.as_str()))
    }

    async fn try_capture_knowledge(&self, capture: KnowledgeCapture) -> Result<CaptureResult> {
        let question = required(&capture.question, "question")?;
        let answer = validate_answer(&capture.answer)?;
        let project = self.resolve_project(capture.project_id.as_deref()).await?;

        let existing = self.store.list_knowledge(Some(&project.id)).await?;
        let check = check_knowledge(&answer, &existing);
        let screened = self
            .screen(&check, capture.force, EntityKind::Knowledge, capture.source.as_deref())
            .await?;
        let Some(action) = screened else {
            return Ok(CaptureResult::duplicate(&check));
        };

        let mut knowledge = Knowledge::new(project.id, question, answer, capture.tags);
        knowledge.source = normalize_text_option(capture.source);
        let knowledge = self.store.put_knowledge(knowledge).await?;

        self.log(
            ActivityLogEntry::new(action, EntityKind::Knowledge, knowledge.id.as_str())
                .with_project(Some(project.id.as_str()))
                .with_source(knowledge.source.as_deref())
                .with_content_hash(knowledge.content_hash.as_deref())
                .with_metadata(duplicate_metadata(&check)),
        )
        .await;
        tracing::debug!("Captured knowledge {}", knowledge.id);
        Ok(CaptureResult::saved(knowledge.id.as_str()))
    }

    /// Decide how a capture proceeds given its duplicate check: `None` blocks
    /// it, otherwise the action to log.
    async fn screen(
        &self,
        check: &DuplicateCheck,
        force: bool,
        kind: EntityKind,
        source: Option<&str>,
    ) -> Result<Option<ActivityAction>> {
        if !check.is_duplicate {
            return Ok(Some(ActivityAction::Save));
        }
        if force {
            return Ok(Some(ActivityAction::ForceSave));
        }

        let existing_id = check
            .existing_item
            .as_ref()
            .map(SavedItem::id)
            .unwrap_or_default();
        self.log(
            ActivityLogEntry::new(ActivityAction::DuplicateDetected, kind, existing_id)
                .with_source(source)
                .with_metadata(duplicate_metadata(check)),
        )
        .await;
        Ok(None)
    }

    async fn try_create_project(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<CaptureResult> {
        let name = required(name, "project name")?;
        let mut project = Project::new(name);
        project.description = normalize_text_option(description);
        let project = self.store.put_project(project).await?;

        self.log(ActivityLogEntry::new(
            ActivityAction::Save,
            EntityKind::Project,
            project.id.as_str(),
        ))
        .await;
        Ok(CaptureResult::saved(project.id.as_str()))
    }

    async fn try_edit_snippet(&self, id: &str, edit: SnippetEdit) -> Result<CaptureResult> {
        let snippet_id = id
            .parse::<SnippetId>()
            .map_err(|_| Error::Validation(format!("invalid snippet id `{id}`")))?;
        let mut snippet = self
            .store
            .get_snippet(&snippet_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("snippet {id}")))?;

        if let Some(code) = edit.code {
            snippet.code = validate_code(&code)?;
        }
        if let Some(language) = edit.language {
            snippet.language = language_or_default(language);
        }
        if let Some(description) = edit.description {
            snippet.description = normalize_text_option(Some(description));
        }
        let snippet = self.store.put_snippet(snippet).await?;

        self.log(
            ActivityLogEntry::new(ActivityAction::Update, EntityKind::Snippet, snippet.id.as_str())
                .with_project(Some(snippet.project_id.as_str()))
                .with_content_hash(snippet.content_hash.as_deref()),
        )
        .await;
        Ok(CaptureResult::saved(snippet.id.as_str()))
    }

    async fn try_edit_knowledge(&self, id: &str, edit: KnowledgeEdit) -> Result<CaptureResult> {
        let knowledge_id = id
            .parse::<KnowledgeId>()
            .map_err(|_| Error::Validation(format!("invalid knowledge id `{id}`")))?;
        let mut knowledge = self
            .store
            .get_knowledge(&knowledge_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("knowledge {id}")))?;

        if let Some(question) = edit.question {
            knowledge.question = required(&question, "question")?;
        }
        if let Some(answer) = edit.answer {
            knowledge.answer = validate_answer(&answer)?;
        }
        if let Some(tags) = edit.tags {
            knowledge.tags = normalize_tags(tags);
        }
        let knowledge = self.store.put_knowledge(knowledge).await?;

        self.log(
            ActivityLogEntry::new(
                ActivityAction::Update,
                EntityKind::Knowledge,
                knowledge.id.as_str(),
            )
            .with_project(Some(knowledge.project_id.as_str()))
            .with_content_hash(knowledge.content_hash.as_deref()),
        )
        .await;
        Ok(CaptureResult::saved(knowledge.id.as_str()))
    }

    async fn try_delete(&self, kind: EntityKind, id: &str) -> Result<CaptureResult> {
        let deleted = self.store.soft_delete(kind, id).await?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("{kind} {id}")));
        }

        self.log(
            ActivityLogEntry::new(ActivityAction::Delete, kind, id)
                .with_metadata(serde_json::json!({ "deleted": deleted })),
        )
        .await;
        tracing::info!("Deleted {} {} ({} record(s))", kind, id, deleted);
        Ok(CaptureResult::saved(id))
    }

    async fn resolve_project(&self, project_id: Option<&str>) -> Result<Project> {
        let Some(raw) = project_id.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return self.store.ensure_default_project().await;
        };
        let id = raw
            .parse::<ProjectId>()
            .map_err(|_| Error::Validation(format!("invalid project id `{raw}`")))?;
        self.store
            .get_project(&id)
            .await?
            .ok_or_else(|| Error::Validation(format!("project {raw} does not exist")))
    }

    /// Activity logging never fails the operation it describes.
    async fn log(&self, entry: ActivityLogEntry) {
        if let Err(error) = self.store.log_activity(&entry).await {
            tracing::warn!("Failed to record activity: {}", error);
        }
    }
}

fn into_result(result: Result<CaptureResult>) -> CaptureResult {
    result.unwrap_or_else(|error| {
        tracing::warn!("Capture failed: {}", error);
        CaptureResult::failed(error.to_string())
    })
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn validate_code(code: &str) -> Result<String> {
    if code.trim().is_empty() {
        return Err(Error::Validation("code must not be empty".to_string()));
    }
    let chars = code.chars().count();
    if chars > MAX_CODE_CHARS {
        return Err(Error::Validation(format!(
            "code is {chars} characters (max {MAX_CODE_CHARS})"
        )));
    }
    Ok(code.to_string())
}

fn validate_answer(answer: &str) -> Result<String> {
    let answer = required(answer, "answer")?;
    let chars = answer.chars().count();
    if chars > MAX_ANSWER_CHARS {
        return Err(Error::Validation(format!(
            "answer is {chars} characters (max {MAX_ANSWER_CHARS})"
        )));
    }
    Ok(answer)
}

fn language_or_default(language: String) -> String {
    normalize_text_option(Some(language))
        .map_or_else(|| DEFAULT_LANGUAGE.to_string(), |language| language.to_lowercase())
}

fn duplicate_metadata(check: &DuplicateCheck) -> serde_json::Value {
    if !check.is_duplicate {
        return serde_json::Value::Null;
    }
    serde_json::json!({
        "matchType": check.match_type,
        "similarity": check.similarity,
        "existingId": check.existing_item.as_ref().map(SavedItem::id),
    })
}
