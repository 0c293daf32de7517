use std::path::Path;

use serde::Serialize;
use snipvault_core::models::Settings;
use snipvault_core::store::ContentStore;
use snipvault_core::util::{is_http_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::commands::common::open_store;
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub api_base_url: Option<String>,
    pub token_set: bool,
    pub sync_enabled: bool,
    pub auto_sync_interval_secs: u64,
    pub device_id: Option<String>,
    pub default_project_id: Option<String>,
}

impl From<&Settings> for ConfigView {
    fn from(settings: &Settings) -> Self {
        Self {
            api_base_url: settings.api_base_url.clone(),
            token_set: settings.auth_token.is_some(),
            sync_enabled: settings.sync_enabled,
            auto_sync_interval_secs: settings.auto_sync_interval_secs,
            device_id: settings.device_id.clone(),
            default_project_id: settings.default_project_id.clone(),
        }
    }
}

pub async fn run_config(command: ConfigCommands, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    match command {
        ConfigCommands::Show { json } => {
            let settings = store.load_settings().await?;
            let view = ConfigView::from(&settings);
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for line in format_config_lines(&view) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        ConfigCommands::SetApiUrl { url } => {
            let url = normalize_api_url(url)?;
            update_settings(&store, |settings| settings.api_base_url = Some(url)).await?;
            println!("Sync server set");
            Ok(())
        }
        ConfigCommands::SetToken { token } => {
            let token = normalize_text_option(Some(token))
                .ok_or_else(|| CliError::Config("token must not be empty".to_string()))?;
            // A new credential re-enables sync after a 401 turned it off
            update_settings(&store, |settings| {
                settings.auth_token = Some(token);
                settings.sync_enabled = true;
            })
            .await?;
            println!("Sync token stored");
            Ok(())
        }
        ConfigCommands::ClearToken => {
            update_settings(&store, |settings| settings.auth_token = None).await?;
            println!("Sync token removed");
            Ok(())
        }
        ConfigCommands::SetInterval { secs } => {
            if secs == 0 {
                return Err(CliError::Config(
                    "interval must be at least 1 second".to_string(),
                ));
            }
            update_settings(&store, |settings| settings.auto_sync_interval_secs = secs).await?;
            println!("Auto-sync interval set to {secs}s");
            Ok(())
        }
        ConfigCommands::Enable => {
            update_settings(&store, |settings| settings.sync_enabled = true).await?;
            println!("Sync enabled");
            Ok(())
        }
        ConfigCommands::Disable => {
            update_settings(&store, |settings| settings.sync_enabled = false).await?;
            println!("Sync disabled");
            Ok(())
        }
    }
}

async fn update_settings(
    store: &ContentStore,
    apply: impl FnOnce(&mut Settings),
) -> Result<Settings, CliError> {
    let mut settings = store.load_settings().await?;
    apply(&mut settings);
    store.save_settings(&settings).await?;
    Ok(settings)
}

pub fn normalize_api_url(url: String) -> Result<String, CliError> {
    let normalized = normalize_text_option(Some(url))
        .ok_or_else(|| CliError::Config("api url must not be empty".to_string()))?;
    if !is_http_url(&normalized) {
        return Err(CliError::Config(
            "api url must include http:// or https://".to_string(),
        ));
    }
    Ok(normalized.trim_end_matches('/').to_string())
}

pub fn format_config_lines(view: &ConfigView) -> Vec<String> {
    vec![
        format!(
            "api_base_url:        {}",
            view.api_base_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "auth_token:          {}",
            if view.token_set { "[set]" } else { "(not set)" }
        ),
        format!("sync_enabled:        {}", view.sync_enabled),
        format!("auto_sync_interval:  {}s", view.auto_sync_interval_secs),
        format!(
            "device_id:           {}",
            view.device_id.as_deref().unwrap_or("(assigned on first sync)")
        ),
    ]
}
