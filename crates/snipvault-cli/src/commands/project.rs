use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use snipvault_core::capture::CaptureService;
use snipvault_core::Project;

use crate::commands::common::{format_relative_time, open_store, report_capture, short_id};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_default: bool,
    pub snippets: usize,
    pub knowledge: usize,
    pub created_at: i64,
}

pub async fn run_project_add(
    name: &str,
    description: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let result = CaptureService::new(store)
        .create_project(name, description)
        .await;
    report_capture(&result, false)
}

pub async fn list_projects(db_path: &Path) -> Result<Vec<ProjectListItem>, CliError> {
    let store = open_store(db_path).await?;
    let default_project = store.ensure_default_project().await?;

    let mut projects = store.list_projects().await?;
    projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

    let mut items = Vec::with_capacity(projects.len());
    for project in projects {
        let snippets = store.list_snippets(Some(&project.id)).await?.len();
        let knowledge = store.list_knowledge(Some(&project.id)).await?.len();
        items.push(project_to_list_item(
            &project,
            project.id == default_project.id,
            snippets,
            knowledge,
        ));
    }
    Ok(items)
}

pub async fn run_project_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let projects = list_projects(db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for project in &projects {
        let marker = if project.is_default { "*" } else { " " };
        println!(
            "{marker} {:<13}  {:<24}  {:>4} snippets  {:>4} knowledge  {}",
            short_id(&project.id),
            project.name,
            project.snippets,
            project.knowledge,
            format_relative_time(project.created_at, now_ms)
        );
    }
    Ok(())
}

fn project_to_list_item(
    project: &Project,
    is_default: bool,
    snippets: usize,
    knowledge: usize,
) -> ProjectListItem {
    ProjectListItem {
        id: project.id.as_str(),
        name: project.name.clone(),
        description: project.description.clone(),
        is_default,
        snippets,
        knowledge,
        created_at: project.created_at,
    }
}
