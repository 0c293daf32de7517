use std::path::Path;

use snipvault_core::capture::{CaptureService, KnowledgeCapture, SnippetCapture};

use crate::cli::CaptureTarget;
use crate::commands::common::{
    normalize_content, open_store, report_capture, resolve_content, resolve_project_filter,
};
use crate::error::CliError;

pub async fn run_add_snippet(
    code_parts: &[String],
    language: Option<String>,
    description: Option<String>,
    target: &CaptureTarget,
    db_path: &Path,
) -> Result<(), CliError> {
    let code = resolve_content(code_parts, language.as_deref().unwrap_or(""))?;

    let store = open_store(db_path).await?;
    let project_id = resolve_project_filter(&store, target.project.as_deref()).await?;
    let service = CaptureService::new(store);

    let result = service
        .capture_snippet(SnippetCapture {
            code,
            language: language.unwrap_or_default(),
            source: target.source.clone(),
            description,
            project_id: project_id.map(|id| id.as_str()),
            force: target.force,
        })
        .await;

    report_capture(&result, target.json)
}

pub async fn run_add_knowledge(
    question: &str,
    answer: Option<&str>,
    tags: Vec<String>,
    target: &CaptureTarget,
    db_path: &Path,
) -> Result<(), CliError> {
    let answer = match answer.and_then(normalize_content) {
        Some(answer) => answer,
        None => resolve_content(&[], "markdown")?,
    };

    let store = open_store(db_path).await?;
    let project_id = resolve_project_filter(&store, target.project.as_deref()).await?;
    let service = CaptureService::new(store);

    let result = service
        .capture_knowledge(KnowledgeCapture {
            question: question.to_string(),
            answer,
            source: target.source.clone(),
            tags,
            project_id: project_id.map(|id| id.as_str()),
            force: target.force,
        })
        .await;

    report_capture(&result, target.json)
}
