//! Client sync engine: drains the outbox to the server, then merges remote
//! changes with last-write-wins on `updatedAt`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use super::protocol::{validate_record, ChangeSet, PullQuery, PushRequest, MAX_CHANGES_PER_TYPE};
use super::transport::{SyncTransport, TransportError};
use crate::error::{Error, Result};
use crate::models::{ActivityAction, ActivityLogEntry, EntityKind, Record, SyncQueueItem};
use crate::state::SyncState;
use crate::store::ContentStore;

/// Failed attempts after which a queued change is dropped
pub const MAX_RETRIES: u32 = 3;

/// Result of a [`SyncEngine::sync`] request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was running; nothing was done
    AlreadyInProgress,
    /// Sync is switched off in settings
    Disabled,
}

/// What one push+pull cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Records acknowledged by the server
    pub pushed: usize,
    /// Records dropped from the outbox as unrecoverable
    pub dropped: usize,
    pub push_version: Option<i64>,
    pub pulled_applied: usize,
    pub pulled_skipped: usize,
    pub pull_version: Option<i64>,
    /// Recoverable failures; affected items stay queued
    pub errors: Vec<String>,
}

/// Counts from merging pulled records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: SyncState,
    pub enabled: bool,
    pub in_progress: bool,
    pub pending_changes: usize,
    pub last_pull_sync_version: i64,
    pub degraded_store: bool,
    pub device_id: Option<String>,
}

/// Outbox entries for one record, collapsed to its latest state
#[derive(Debug, Clone)]
struct PendingChange {
    record: Record,
    queue_ids: Vec<i64>,
    retries: u32,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles a [`ContentStore`] with the remote store.
///
/// At most one cycle runs at a time; a concurrent request returns
/// [`SyncOutcome::AlreadyInProgress`] immediately.
pub struct SyncEngine {
    store: ContentStore,
    transport: Arc<dyn SyncTransport>,
    in_flight: AtomicBool,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(store: ContentStore, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            store,
            transport,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SyncState::Offline),
        }
    }

    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one push then pull cycle.
    ///
    /// Recoverable transport failures are reported in [`SyncReport::errors`].
    /// A rejected credential disables sync and is returned as an error.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Sync already in progress");
            return Ok(SyncOutcome::AlreadyInProgress);
        };

        let settings = self.store.load_settings().await?;
        if !settings.sync_enabled {
            *self.state.lock().await = SyncState::Offline;
            return Ok(SyncOutcome::Disabled);
        }

        *self.state.lock().await = SyncState::Syncing;
        let result = self.run_cycle().await;
        *self.state.lock().await = match &result {
            Ok(report) if report.errors.is_empty() => SyncState::Synced,
            Err(Error::Transport(TransportError::Unauthorized(_))) => SyncState::Offline,
            _ => SyncState::Error,
        };

        let report = result?;
        tracing::info!(
            pushed = report.pushed,
            dropped = report.dropped,
            pulled = report.pulled_applied,
            skipped = report.pulled_skipped,
            errors = report.errors.len(),
            "Sync cycle finished"
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let device_id = self.store.ensure_device_id().await?;
        let mut report = SyncReport::default();

        if self.push_pending(&device_id, &mut report).await? {
            self.pull_changes(&device_id, &mut report).await?;
        }
        Ok(report)
    }

    /// Push the outbox in chunks. Returns `false` when a retryable failure
    /// means the server is unreachable and pulling is pointless.
    async fn push_pending(&self, device_id: &str, report: &mut SyncReport) -> Result<bool> {
        let queue = self.store.pending_changes().await?;
        if queue.is_empty() {
            return Ok(true);
        }

        let mut valid = Vec::new();
        for change in coalesce(queue) {
            match validate_record(&change.record) {
                Ok(()) => valid.push(change),
                Err(reason) => {
                    self.drop_change(&change, &reason).await?;
                    report.dropped += 1;
                }
            }
        }

        let last_sync_version = self.store.load_settings().await?.last_pull_sync_version;
        for batch in chunk(valid) {
            let mut changes = ChangeSet::default();
            for change in &batch {
                changes.push(change.record.clone());
            }
            let request = PushRequest {
                device_id: device_id.to_string(),
                last_sync_version,
                changes,
            };

            match self.transport.push(&request).await {
                Ok(response) => {
                    self.acknowledge(&batch, response.sync_version).await?;
                    report.pushed += batch.len();
                    report.push_version = Some(response.sync_version);
                }
                Err(TransportError::InvalidReferences { ids, sync_version }) => {
                    let (rejected, accepted): (Vec<_>, Vec<_>) = batch
                        .into_iter()
                        .partition(|change| ids.contains(&change.record.id()));
                    self.acknowledge(&accepted, sync_version).await?;
                    report.pushed += accepted.len();
                    report.push_version = Some(sync_version);
                    report.dropped += self
                        .fail_changes(&rejected, "invalid project reference")
                        .await?;
                    report
                        .errors
                        .push(format!("{} change(s) referenced unknown projects", rejected.len()));
                }
                Err(TransportError::Unauthorized(message)) => {
                    return Err(self.disable_sync(message).await);
                }
                Err(error) => {
                    tracing::warn!("Push failed: {}", error);
                    report.dropped += self.fail_changes(&batch, &error.to_string()).await?;
                    report.errors.push(error.to_string());
                    if error.is_retryable() {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    async fn pull_changes(&self, device_id: &str, report: &mut SyncReport) -> Result<()> {
        let since = self.store.load_settings().await?.last_pull_sync_version;
        let query = PullQuery {
            since,
            project_id: None,
            device_id: Some(device_id.to_string()),
        };

        let response = match self.transport.pull(&query).await {
            Ok(response) => response,
            Err(TransportError::Unauthorized(message)) => {
                return Err(self.disable_sync(message).await);
            }
            Err(error) => {
                tracing::warn!("Pull failed: {}", error);
                report.errors.push(error.to_string());
                return Ok(());
            }
        };

        let stats = self.merge_pulled(response.changes.into_records()).await?;
        report.pulled_applied += stats.applied;
        report.pulled_skipped += stats.skipped;

        let version = response.sync_version.max(since);
        let mut settings = self.store.load_settings().await?;
        settings.last_pull_sync_version = version;
        self.store.save_settings(&settings).await?;
        report.pull_version = Some(version);
        Ok(())
    }

    /// Apply pulled records: a remote row replaces the local one only when
    /// its `updatedAt` is strictly newer. Applied rows bypass the outbox.
    pub async fn merge_pulled(&self, records: Vec<Record>) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        for mut remote in records {
            let local = self.store.get_by_id(remote.kind(), &remote.id()).await?;
            if local.is_some_and(|local| remote.updated_at() <= local.updated_at()) {
                stats.skipped += 1;
                continue;
            }
            let version = remote.sync_version();
            remote.mark_synced(version);
            self.store.put_direct(remote).await?;
            stats.applied += 1;
        }
        Ok(stats)
    }

    /// Dequeue acknowledged changes and stamp local copies that are still
    /// the pushed version.
    async fn acknowledge(&self, changes: &[PendingChange], sync_version: i64) -> Result<()> {
        let ids: Vec<i64> = changes
            .iter()
            .flat_map(|change| change.queue_ids.iter().copied())
            .collect();
        self.store.dequeue(&ids).await?;

        for change in changes {
            let pushed = &change.record;
            if let Some(mut local) = self.store.get_by_id(pushed.kind(), &pushed.id()).await? {
                if local.updated_at() == pushed.updated_at() {
                    local.mark_synced(sync_version);
                    self.store.put_direct(local).await?;
                }
            }
        }
        Ok(())
    }

    /// Count a failed attempt; returns how many changes ran out of retries.
    async fn fail_changes(&self, changes: &[PendingChange], reason: &str) -> Result<usize> {
        let mut dropped = 0;
        let mut retry_ids = Vec::new();
        for change in changes {
            if change.retries + 1 > MAX_RETRIES {
                self.drop_change(change, reason).await?;
                dropped += 1;
            } else {
                retry_ids.extend(change.queue_ids.iter().copied());
            }
        }
        self.store.bump_retries(&retry_ids).await?;
        Ok(dropped)
    }

    async fn drop_change(&self, change: &PendingChange, reason: &str) -> Result<()> {
        let record = &change.record;
        tracing::warn!(
            "Dropping queued {} {} after {} retries: {}",
            record.kind(),
            record.id(),
            change.retries,
            reason
        );
        self.store.dequeue(&change.queue_ids).await?;
        let entry = ActivityLogEntry::new(ActivityAction::SyncDropped, record.kind(), record.id())
            .with_project(record.project_id())
            .with_content_hash(record.content_hash())
            .with_metadata(serde_json::json!({
                "reason": reason,
                "retries": change.retries,
            }));
        self.store.log_activity(&entry).await?;
        Ok(())
    }

    async fn disable_sync(&self, message: String) -> Error {
        tracing::warn!("Sync credential rejected, disabling sync: {}", message);
        match self.store.load_settings().await {
            Ok(mut settings) => {
                settings.sync_enabled = false;
                if let Err(error) = self.store.save_settings(&settings).await {
                    return error;
                }
            }
            Err(error) => return error,
        }
        Error::Transport(TransportError::Unauthorized(message))
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let settings = self.store.load_settings().await?;
        Ok(EngineStatus {
            state: *self.state.lock().await,
            enabled: settings.sync_enabled,
            in_progress: self.is_syncing(),
            pending_changes: self.store.queue_len().await?,
            last_pull_sync_version: settings.last_pull_sync_version,
            degraded_store: self.store.is_degraded(),
            device_id: settings.device_id,
        })
    }

    /// Sync every `interval` until sync is disabled or the credential is rejected.
    pub async fn run_auto_sync(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sync().await {
                Ok(SyncOutcome::Completed(report)) => {
                    tracing::debug!("Auto-sync completed: {:?}", report);
                }
                Ok(SyncOutcome::AlreadyInProgress) => {}
                Ok(SyncOutcome::Disabled) => {
                    tracing::info!("Sync disabled, stopping auto-sync");
                    break;
                }
                Err(Error::Transport(TransportError::Unauthorized(_))) => break,
                Err(error) => tracing::warn!("Auto-sync failed: {}", error),
            }
        }
    }

    pub fn spawn_auto_sync(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run_auto_sync(interval).await })
    }
}

/// Collapse outbox entries per record, keeping the newest `updatedAt`
/// (later entries win ties). Order follows first appearance.
fn coalesce(queue: Vec<SyncQueueItem>) -> Vec<PendingChange> {
    let mut order: Vec<(EntityKind, String)> = Vec::new();
    let mut changes: HashMap<(EntityKind, String), PendingChange> = HashMap::new();

    for item in queue {
        let record = item.outgoing();
        let key = (record.kind(), record.id());
        if let Some(change) = changes.get_mut(&key) {
            if record.updated_at() >= change.record.updated_at() {
                change.record = record;
            }
            change.queue_ids.push(item.id);
            change.retries = change.retries.max(item.retries);
        } else {
            order.push(key.clone());
            changes.insert(
                key,
                PendingChange {
                    record,
                    queue_ids: vec![item.id],
                    retries: item.retries,
                },
            );
        }
    }

    order
        .into_iter()
        .filter_map(|key| changes.remove(&key))
        .collect()
}

/// Split into push batches of at most [`MAX_CHANGES_PER_TYPE`] per kind,
/// projects first so batches can create their own parents.
fn chunk(mut changes: Vec<PendingChange>) -> Vec<Vec<PendingChange>> {
    changes.sort_by_key(|change| change.record.kind());

    let mut batches = Vec::new();
    let mut batch: Vec<PendingChange> = Vec::new();
    let mut counts: HashMap<EntityKind, usize> = HashMap::new();
    for change in changes {
        let count = counts.entry(change.record.kind()).or_default();
        if *count == MAX_CHANGES_PER_TYPE {
            batches.push(std::mem::take(&mut batch));
            counts.clear();
        }
        *counts.entry(change.record.kind()).or_default() += 1;
        batch.push(change);
    }
    if !batch.is_empty() {
        batches.push(batch);
    }
    batches
}
