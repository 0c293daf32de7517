use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use snipvault_core::config::SyncConfig;
use snipvault_core::store::ContentStore;
use snipvault_core::sync::{HttpSyncTransport, SyncEngine, SyncOutcome, SyncReport};

use crate::commands::common::{
    format_activity_lines, format_queue_lines, open_store, require_sync_config,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusView {
    pub configured: bool,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    pub pending_changes: usize,
    pub last_pull_sync_version: i64,
    pub auto_sync_interval_secs: u64,
    pub degraded_store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

async fn open_sync_engine(db_path: &Path) -> Result<(SyncEngine, SyncConfig), CliError> {
    let store = open_store(db_path).await?;
    let config = require_sync_config(&store).await?;
    let transport = HttpSyncTransport::from_config(&config).map_err(snipvault_core::Error::from)?;
    Ok((SyncEngine::new(store, Arc::new(transport)), config))
}

pub async fn run_sync(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (engine, _) = open_sync_engine(db_path).await?;
    let outcome = engine.sync().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        SyncOutcome::Completed(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
        }
        SyncOutcome::AlreadyInProgress => println!("Sync already in progress"),
        SyncOutcome::Disabled => {
            println!("Sync is disabled. Run `snipvault config enable` to turn it back on.");
        }
    }
    Ok(())
}

/// Sync on an interval until Ctrl-C, or until sync gets disabled
pub async fn run_sync_watch(interval_secs: Option<u64>, db_path: &Path) -> Result<(), CliError> {
    let (engine, config) = open_sync_engine(db_path).await?;
    let interval = interval_secs
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or(config.auto_sync_interval);

    tracing::info!("Auto-sync every {}s, press Ctrl-C to stop", interval.as_secs());
    let mut handle = Arc::new(engine).spawn_auto_sync(interval);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            handle.abort();
            signal?;
            println!("Auto-sync stopped");
        }
        finished = &mut handle => {
            if let Err(error) = finished {
                tracing::warn!("Auto-sync task ended abnormally: {}", error);
            }
            println!("Auto-sync stopped: sync is disabled or the token was rejected");
        }
    }
    Ok(())
}

pub async fn sync_status(store: &ContentStore) -> Result<SyncStatusView, CliError> {
    let settings = store.load_settings().await?;
    let config = SyncConfig::from_env(&settings);

    Ok(SyncStatusView {
        configured: config.is_configured(),
        enabled: config.enabled,
        api_base_url: config.api_base_url,
        pending_changes: store.queue_len().await?,
        last_pull_sync_version: settings.last_pull_sync_version,
        auto_sync_interval_secs: config.auto_sync_interval.as_secs(),
        degraded_store: store.is_degraded(),
        device_id: settings.device_id,
    })
}

pub async fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let status = sync_status(&store).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let server = status.api_base_url.as_deref().unwrap_or("(not set)");
    println!("server:           {server}");
    println!(
        "sync:             {}",
        match (status.configured, status.enabled) {
            (false, _) => "not configured",
            (true, false) => "disabled",
            (true, true) => "enabled",
        }
    );
    println!("pending changes:  {}", status.pending_changes);
    println!("last pull:        version {}", status.last_pull_sync_version);
    println!("auto-sync every:  {}s", status.auto_sync_interval_secs);
    if status.degraded_store {
        println!("store:            fallback (degraded)");
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pushed {} change(s){}, pulled {} ({} skipped as older){}",
        report.pushed,
        report
            .push_version
            .map(|version| format!(" at version {version}"))
            .unwrap_or_default(),
        report.pulled_applied,
        report.pulled_skipped,
        report
            .pull_version
            .map(|version| format!(", now at version {version}"))
            .unwrap_or_default(),
    )];
    if report.dropped > 0 {
        lines.push(format!(
            "Dropped {} change(s) that could not be synced; see `snipvault activity`",
            report.dropped
        ));
    }
    lines.extend(report.errors.iter().map(|error| format!("warning: {error}")));
    lines
}

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let queue = store.pending_changes().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
    } else if queue.is_empty() {
        println!("Nothing waiting to sync.");
    } else {
        for line in format_queue_lines(&queue) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_activity(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entries = store.recent_activity(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No activity recorded.");
    } else {
        for line in format_activity_lines(&entries) {
            println!("{line}");
        }
    }
    Ok(())
}
