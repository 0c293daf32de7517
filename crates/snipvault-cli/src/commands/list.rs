use std::path::Path;

use snipvault_core::SavedItem;

use crate::cli::{ItemFilter, ItemTypeFilter};
use crate::commands::common::{
    format_item_lines, item_to_list_item, open_store, resolve_project_filter, ItemListItem,
};
use crate::error::CliError;

/// Live items matching `filter`, most recently updated first
pub async fn list_items(
    filter: &ItemFilter,
    limit: usize,
    db_path: &Path,
) -> Result<Vec<SavedItem>, CliError> {
    let store = open_store(db_path).await?;
    let project_id = resolve_project_filter(&store, filter.project.as_deref()).await?;

    let mut items = store
        .saved_items(project_id.as_ref())
        .await?
        .into_iter()
        .filter(|item| match item {
            SavedItem::Snippet(_) => ItemTypeFilter::includes_snippets(filter.item_type),
            SavedItem::Knowledge(_) => ItemTypeFilter::includes_knowledge(filter.item_type),
        })
        .collect::<Vec<SavedItem>>();

    items.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
    items.truncate(limit);
    Ok(items)
}

pub async fn run_list(
    filter: &ItemFilter,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let items = list_items(filter, limit, db_path).await?;

    if as_json {
        let json_items = items
            .iter()
            .map(item_to_list_item)
            .collect::<Vec<ItemListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if items.is_empty() {
        println!("Nothing saved yet.");
    } else {
        for line in format_item_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}
