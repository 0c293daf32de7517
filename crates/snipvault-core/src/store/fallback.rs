//! Degraded fallback engine: a single JSON document rewritten on each change.
//!
//! There are no secondary indexes; lookups by project or fingerprint scan
//! every record of the kind. The activity log is capped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Index, StoreBackend, WriteMode};
use crate::error::Result;
use crate::models::{ActivityLogEntry, EntityKind, QueueOperation, Record, SyncQueueItem};
use crate::util::now_ms;

/// Activity entries retained by the fallback engine
pub const FALLBACK_ACTIVITY_CAP: usize = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FallbackState {
    records: BTreeMap<EntityKind, BTreeMap<String, Record>>,
    queue: Vec<SyncQueueItem>,
    next_queue_id: i64,
    settings: BTreeMap<String, String>,
    activity: Vec<ActivityLogEntry>,
    next_activity_id: i64,
}

impl FallbackState {
    fn enqueue(&mut self, operation: QueueOperation, record: &Record, timestamp: i64) {
        self.next_queue_id += 1;
        self.queue.push(SyncQueueItem {
            id: self.next_queue_id,
            operation,
            record: record.clone(),
            timestamp,
            retries: 0,
        });
    }
}

/// JSON-file store used when the database engine is unavailable
pub struct FallbackBackend {
    path: PathBuf,
    state: FallbackState,
}

impl FallbackBackend {
    /// Load the document at `path`, starting empty if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let state = match std::fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => FallbackState::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                FallbackState::default()
            }
            Err(error) => return Err(error.into()),
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    fn persist(&self, state: &FallbackState) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to a copy of the state and keep it only once the copy
    /// is on disk; a failed write leaves the visible state untouched.
    fn commit<T>(&mut self, change: impl FnOnce(&mut FallbackState) -> T) -> Result<T> {
        let mut next = self.state.clone();
        let value = change(&mut next);
        self.persist(&next)?;
        self.state = next;
        Ok(value)
    }

    fn sorted(records: impl Iterator<Item = Record>) -> Vec<Record> {
        let mut records: Vec<Record> = records.collect();
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        records
    }
}

impl StoreBackend for FallbackBackend {
    fn is_degraded(&self) -> bool {
        true
    }

    fn write(&mut self, records: &[Record], mode: WriteMode) -> Result<()> {
        let now = now_ms();
        self.commit(|state| {
            for record in records {
                state
                    .records
                    .entry(record.kind())
                    .or_default()
                    .insert(record.id(), record.clone());
                if mode == WriteMode::Queued {
                    state.enqueue(QueueOperation::Upsert, record, now);
                }
            }
        })
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        Ok(self
            .state
            .records
            .get(&kind)
            .and_then(|table| table.get(id))
            .cloned())
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        Ok(Self::sorted(
            self.state
                .records
                .get(&kind)
                .into_iter()
                .flat_map(|table| table.values().cloned()),
        ))
    }

    fn find(&self, kind: EntityKind, index: &Index) -> Result<Vec<Record>> {
        Ok(self
            .list(kind)?
            .into_iter()
            .filter(|record| index.matches(record))
            .collect())
    }

    fn queue(&self) -> Result<Vec<SyncQueueItem>> {
        Ok(self.state.queue.clone())
    }

    fn dequeue(&mut self, ids: &[i64]) -> Result<()> {
        self.commit(|state| state.queue.retain(|item| !ids.contains(&item.id)))
    }

    fn bump_retries(&mut self, ids: &[i64]) -> Result<()> {
        self.commit(|state| {
            for item in state.queue.iter_mut().filter(|item| ids.contains(&item.id)) {
                item.retries += 1;
            }
        })
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.settings.get(key).cloned())
    }

    fn set_setting(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        self.commit(|state| match value {
            Some(value) => {
                state.settings.insert(key.to_string(), value.to_string());
            }
            None => {
                state.settings.remove(key);
            }
        })
    }

    fn append_activity(&mut self, entry: &ActivityLogEntry) -> Result<i64> {
        self.commit(|state| {
            state.next_activity_id += 1;
            let id = state.next_activity_id;
            state.activity.push(ActivityLogEntry {
                id,
                ..entry.clone()
            });
            let overflow = state.activity.len().saturating_sub(FALLBACK_ACTIVITY_CAP);
            state.activity.drain(..overflow);
            id
        })
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        Ok(self.state.activity.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityAction, Project};

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let project = Project::new("Persisted");
        {
            let mut backend = FallbackBackend::open(&path).unwrap();
            backend
                .write(&[project.clone().into()], WriteMode::Queued)
                .unwrap();
            backend.set_setting("device_id", Some("d1")).unwrap();
        }

        let backend = FallbackBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(EntityKind::Project, &project.id.as_str()).unwrap(),
            Some(Record::Project(project))
        );
        assert_eq!(backend.queue().unwrap().len(), 1);
        assert_eq!(backend.setting("device_id").unwrap().as_deref(), Some("d1"));
    }

    #[test]
    fn test_queue_ids_keep_increasing_after_dequeue() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FallbackBackend::open(&dir.path().join("store.json")).unwrap();

        backend
            .write(&[Project::new("a").into()], WriteMode::Queued)
            .unwrap();
        let first = backend.queue().unwrap()[0].id;
        backend.dequeue(&[first]).unwrap();
        backend
            .write(&[Project::new("b").into()], WriteMode::Queued)
            .unwrap();

        assert!(backend.queue().unwrap()[0].id > first);
    }

    #[test]
    fn test_failed_persist_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let mut backend = FallbackBackend::open(&data_dir.join("store.json")).unwrap();
        let kept = Project::new("kept");
        backend.write(&[kept.clone().into()], WriteMode::Queued).unwrap();

        // Swap the data directory for a plain file so every save fails
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"not a directory").unwrap();

        let lost = Project::new("lost");
        assert!(backend.write(&[lost.clone().into()], WriteMode::Queued).is_err());
        assert!(backend.get(EntityKind::Project, &lost.id.as_str()).unwrap().is_none());
        assert_eq!(backend.queue().unwrap().len(), 1);

        let mut tombstone = kept.clone();
        tombstone.is_deleted = true;
        assert!(backend.write(&[tombstone.into()], WriteMode::Queued).is_err());
        assert_eq!(
            backend.get(EntityKind::Project, &kept.id.as_str()).unwrap(),
            Some(Record::Project(kept))
        );

        let queued = backend.queue().unwrap()[0].id;
        assert!(backend.bump_retries(&[queued]).is_err());
        assert!(backend.dequeue(&[queued]).is_err());
        assert_eq!(backend.queue().unwrap()[0].retries, 0);

        assert!(backend.set_setting("device_id", Some("d1")).is_err());
        assert_eq!(backend.setting("device_id").unwrap(), None);

        let entry = ActivityLogEntry::new(ActivityAction::Save, EntityKind::Project, "x");
        assert!(backend.append_activity(&entry).is_err());
        assert!(backend.recent_activity(10).unwrap().is_empty());
    }

    #[test]
    fn test_activity_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FallbackBackend::open(&dir.path().join("store.json")).unwrap();

        for i in 0..(FALLBACK_ACTIVITY_CAP + 5) {
            let entry =
                ActivityLogEntry::new(ActivityAction::Save, EntityKind::Snippet, i.to_string());
            backend.append_activity(&entry).unwrap();
        }

        let recent = backend.recent_activity(usize::MAX).unwrap();
        assert_eq!(recent.len(), FALLBACK_ACTIVITY_CAP);
        assert_eq!(recent[0].item_id, (FALLBACK_ACTIVITY_CAP + 4).to_string());
    }
}
