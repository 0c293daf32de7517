use std::path::Path;

use snipvault_core::capture::{CaptureService, KnowledgeEdit, SnippetEdit};
use snipvault_core::models::EntityKind;
use snipvault_core::{KnowledgeId, SnippetId};

use crate::commands::common::{
    capture_editor_input_with_initial, open_store, report_capture, resolve_item_id,
};
use crate::error::CliError;

pub async fn run_edit_snippet(
    id: &str,
    mut edit: SnippetEdit,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let id = resolve_item_id(&store, EntityKind::Snippet, id).await?;

    if edit == SnippetEdit::default() {
        let snippet_id = id
            .parse::<SnippetId>()
            .map_err(|_| CliError::NotFound("snippet", id.clone()))?;
        let Some(snippet) = store.get_snippet(&snippet_id).await? else {
            return Err(CliError::NotFound("snippet", id));
        };
        let Some(code) = capture_editor_input_with_initial(&snippet.code, &snippet.language)?
        else {
            return Err(CliError::EmptyEditedContent);
        };
        if code == snippet.code.trim() {
            println!("{id}");
            return Ok(());
        }
        edit.code = Some(code);
    }

    let result = CaptureService::new(store).edit_snippet(&id, edit).await;
    report_capture(&result, false)
}

pub async fn run_edit_knowledge(
    id: &str,
    mut edit: KnowledgeEdit,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let id = resolve_item_id(&store, EntityKind::Knowledge, id).await?;

    if edit == KnowledgeEdit::default() {
        let knowledge_id = id
            .parse::<KnowledgeId>()
            .map_err(|_| CliError::NotFound("knowledge", id.clone()))?;
        let Some(knowledge) = store.get_knowledge(&knowledge_id).await? else {
            return Err(CliError::NotFound("knowledge", id));
        };
        let Some(answer) = capture_editor_input_with_initial(&knowledge.answer, "markdown")? else {
            return Err(CliError::EmptyEditedContent);
        };
        if answer == knowledge.answer.trim() {
            println!("{id}");
            return Ok(());
        }
        edit.answer = Some(answer);
    }

    let result = CaptureService::new(store).edit_knowledge(&id, edit).await;
    report_capture(&result, false)
}
