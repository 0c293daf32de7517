use std::path::Path;

use snipvault_core::matcher::{match_context, EditorContext, MatchOptions, MatchResult};
use snipvault_core::util::now_ms;

use crate::commands::common::{open_store, read_piped_stdin, short_id};
use crate::error::CliError;

pub fn parse_editor_context(input: &str) -> Result<EditorContext, CliError> {
    if input.trim().is_empty() {
        return Err(CliError::InvalidContext("no context provided".to_string()));
    }
    serde_json::from_str(input).map_err(|error| CliError::InvalidContext(error.to_string()))
}

pub async fn match_items(
    context: &EditorContext,
    options: &MatchOptions,
    db_path: &Path,
) -> Result<Vec<MatchResult>, CliError> {
    let store = open_store(db_path).await?;
    let snippets = store.list_snippets(None).await?;
    let knowledge = store.list_knowledge(None).await?;
    Ok(match_context(context, &snippets, &knowledge, options, now_ms()))
}

pub async fn run_context(
    file: Option<&Path>,
    min_score: Option<f64>,
    limit: Option<usize>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_piped_stdin()?.unwrap_or_default(),
    };
    let context = parse_editor_context(&input)?;

    let mut options = MatchOptions::default();
    if let Some(min_score) = min_score {
        options.min_score = min_score;
    }
    if let Some(limit) = limit {
        options.max_results = limit;
    }

    let matches = match_items(&context, &options, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No relevant items.");
        return Ok(());
    }

    for line in format_match_lines(&matches) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_match_lines(matches: &[MatchResult]) -> Vec<String> {
    matches
        .iter()
        .map(|result| {
            format!(
                "{:>6.1}  {:<9}  {:<13}  {:<40}  {}",
                result.relevance_score,
                result.item.kind().as_str(),
                short_id(&result.item.id()),
                result.item.title(40),
                result.match_reasons.join("; ")
            )
        })
        .collect()
}
