use std::path::Path;

use serde::Serialize;
use snipvault_core::search::{
    search_all, search_knowledge, search_snippets, SearchOptions, SearchResult,
};

use crate::cli::{ItemFilter, ItemTypeFilter};
use crate::commands::common::{
    format_item_lines, item_to_list_item, normalize_search_query, open_store,
    resolve_project_filter, ItemListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub item: ItemListItem,
    pub score: u32,
}

pub async fn search_items(
    query: &str,
    filter: &ItemFilter,
    limit: Option<usize>,
    db_path: &Path,
) -> Result<Vec<SearchResult>, CliError> {
    let query = normalize_search_query(query)?;
    let store = open_store(db_path).await?;
    let project_id = resolve_project_filter(&store, filter.project.as_deref()).await?;

    let mut options = match filter.item_type {
        Some(_) => SearchOptions::default(),
        None => SearchOptions::unified(),
    };
    options.project_id = project_id;
    if let Some(limit) = limit {
        options.limit = limit;
    }

    let results = match filter.item_type {
        Some(ItemTypeFilter::Snippet) => {
            let snippets = store.list_snippets(options.project_id.as_ref()).await?;
            search_snippets(&query, &snippets, &options)
        }
        Some(ItemTypeFilter::Knowledge) => {
            let knowledge = store.list_knowledge(options.project_id.as_ref()).await?;
            search_knowledge(&query, &knowledge, &options)
        }
        None => {
            let snippets = store.list_snippets(options.project_id.as_ref()).await?;
            let knowledge = store.list_knowledge(options.project_id.as_ref()).await?;
            search_all(&query, &snippets, &knowledge, &options)
        }
    };
    Ok(results)
}

pub async fn run_search(
    query: &str,
    filter: &ItemFilter,
    limit: Option<usize>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let results = search_items(query, filter, limit, db_path).await?;

    if as_json {
        let hits = results
            .iter()
            .map(|result| SearchHit {
                item: item_to_list_item(&result.item),
                score: result.score,
            })
            .collect::<Vec<SearchHit>>();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    let lines = format_item_lines(results.iter().map(|result| &result.item));
    for (line, result) in lines.iter().zip(&results) {
        println!("{:>4}  {line}", result.score);
    }
    Ok(())
}
