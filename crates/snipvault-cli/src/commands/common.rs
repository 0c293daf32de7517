use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use snipvault_core::capture::CaptureResult;
use snipvault_core::config::SyncConfig;
use snipvault_core::models::{ActivityLogEntry, EntityKind, ProjectId, SyncQueueItem};
use snipvault_core::store::ContentStore;
use snipvault_core::SavedItem;

use crate::error::CliError;

const SHORT_ID_CHARS: usize = 13;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemListItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub title: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub async fn open_store(path: &Path) -> Result<ContentStore, CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = ContentStore::open(path).await?;
    if store.is_degraded() {
        tracing::warn!("Running on the fallback store; some lookups are slower");
    }
    Ok(store)
}

/// Sync settings for `store`, or an error when there is no server to talk to
pub async fn require_sync_config(store: &ContentStore) -> Result<SyncConfig, CliError> {
    let settings = store.load_settings().await?;
    let config = SyncConfig::from_env(&settings);
    if config.is_configured() {
        Ok(config)
    } else {
        Err(CliError::SyncNotConfigured)
    }
}

/// Resolve a full id or unique id prefix among live records of `kind`
pub async fn resolve_item_id(
    store: &ContentStore,
    kind: EntityKind,
    query: &str,
) -> Result<String, CliError> {
    let query = normalize_identifier(query)?;
    if let Some(record) = store.get_by_id(kind, &query).await? {
        if !record.is_deleted() {
            return Ok(record.id());
        }
    }

    let matches = store
        .get_all(kind)
        .await?
        .into_iter()
        .filter(|record| !record.is_deleted() && record.id().starts_with(&query))
        .map(|record| record.id())
        .collect::<Vec<String>>();

    match matches.as_slice() {
        [] => Err(CliError::NotFound(kind.as_str(), query)),
        [single] => Ok(single.clone()),
        _ => {
            let options = matches
                .iter()
                .take(5)
                .map(|id| id.chars().take(SHORT_ID_CHARS).collect::<String>())
                .collect::<Vec<String>>()
                .join(", ");

            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub async fn resolve_project_filter(
    store: &ContentStore,
    project: Option<&str>,
) -> Result<Option<ProjectId>, CliError> {
    let Some(query) = project else {
        return Ok(None);
    };
    let id = resolve_item_id(store, EntityKind::Project, query).await?;
    id.parse::<ProjectId>()
        .map(Some)
        .map_err(|_| CliError::NotFound("project", id))
}

/// Print a capture outcome; a refused capture becomes an error after printing
pub fn report_capture(result: &CaptureResult, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if let Some(id) = result.id.as_deref().filter(|_| result.success) {
        println!("{id}");
    }

    if result.success {
        return Ok(());
    }

    let mut message = result
        .error
        .clone()
        .unwrap_or_else(|| "Operation failed".to_string());
    if let Some(existing) = &result.existing_item {
        message.push_str(&format!(
            "\n  existing {} {} saved {}: {}\n  re-run with --force to save anyway",
            existing.kind,
            short_id(&existing.id),
            format_timestamp(existing.saved_at),
            existing.title
        ));
    }
    Err(CliError::Rejected(message))
}

pub fn item_to_list_item(item: &SavedItem) -> ItemListItem {
    let now_ms = Utc::now().timestamp_millis();
    let (project_id, language, tags) = match item {
        SavedItem::Snippet(snippet) => (
            snippet.project_id.to_string(),
            Some(snippet.language.clone()),
            Vec::new(),
        ),
        SavedItem::Knowledge(knowledge) => (
            knowledge.project_id.to_string(),
            None,
            knowledge.tags.clone(),
        ),
    };

    ItemListItem {
        id: item.id(),
        kind: item.kind(),
        title: item.title(80),
        project_id,
        language,
        tags,
        created_at: item.created_at(),
        updated_at: item.updated_at(),
        relative_time: format_relative_time(item.updated_at(), now_ms),
    }
}

pub fn format_item_lines<'a>(items: impl IntoIterator<Item = &'a SavedItem>) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .into_iter()
        .map(|item| {
            let label = match item {
                SavedItem::Snippet(snippet) => snippet.language.clone(),
                SavedItem::Knowledge(knowledge) => knowledge
                    .tags
                    .iter()
                    .map(|tag| format!("#{tag}"))
                    .collect::<Vec<String>>()
                    .join(" "),
            };
            let title = item.title(40);
            let relative_time = format_relative_time(item.updated_at(), now_ms);

            format!(
                "{:<13}  {:<9}  {title:<40}  {relative_time:<10}  {label}",
                short_id(&item.id()),
                item.kind().as_str(),
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

pub fn format_queue_lines(items: &[SyncQueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "#{:<5}  {:<6}  {:<9}  {}  retries={}  queued={}",
                item.id,
                item.operation.as_str(),
                item.kind().as_str(),
                short_id(&item.record.id()),
                item.retries,
                format_timestamp(item.timestamp)
            )
        })
        .collect()
}

pub fn format_activity_lines(entries: &[ActivityLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{}  {:<18}  {:<9}  {}",
                format_timestamp(entry.timestamp),
                entry.action.as_str(),
                entry.item_type.as_str(),
                short_id(&entry.item_id)
            );
            if let Some(platform) = &entry.platform {
                line.push_str(&format!("  via {platform}"));
            }
            if let Some(error) = entry.metadata.get("reason").and_then(|value| value.as_str()) {
                line.push_str(&format!("  ({error})"));
            }
            line
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Content from the arguments, else piped stdin, else `$EDITOR`
pub fn resolve_content(parts: &[String], language: &str) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("", language)? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_lowercase())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
    language: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_file_path(language);
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. `code --wait`
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

/// Editor buffer named after the language so editors pick a syntax mode
pub fn create_temp_file_path(language: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let extension = extension_for_language(language);
    env::temp_dir().join(format!(
        "snipvault-{}-{now}.{extension}",
        std::process::id()
    ))
}

pub fn extension_for_language(language: &str) -> &'static str {
    match language.trim().to_lowercase().as_str() {
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "python" | "py" => "py",
        "rust" | "rs" => "rs",
        "go" | "golang" => "go",
        "shell" | "bash" | "sh" => "sh",
        "markdown" | "md" | "" => "md",
        _ => "txt",
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SNIPVAULT_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snipvault")
        .join("snipvault.db")
}
