//! Content Store: local persistence for projects, snippets and knowledge.
//!
//! Every non-direct write also appends to the sync outbox in the same
//! atomic step. When the `SQLite` engine cannot be opened the store falls
//! back to a JSON file without secondary indexes, where index lookups are
//! full scans.

mod fallback;
mod sqlite;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::models::{
    ActivityLogEntry, EntityKind, Knowledge, KnowledgeId, Project, ProjectId, Record, SavedItem,
    Settings, Snippet, SnippetId, SyncQueueItem, DEFAULT_PROJECT_NAME,
};
use crate::util::now_ms;

pub use fallback::FallbackBackend;
pub use sqlite::SqliteBackend;

/// Secondary index lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    ProjectId(String),
    ContentHash(String),
}

impl Index {
    /// Whether `record` carries this index value
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::ProjectId(project_id) => match record {
                Record::Project(project) => project.id.as_str() == *project_id,
                _ => record.project_id().as_deref() == Some(project_id.as_str()),
            },
            Self::ContentHash(hash) => record.content_hash() == Some(hash.as_str()),
        }
    }
}

/// How a write interacts with the sync outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// User-originated: enqueue an upsert for the next push
    Queued,
    /// Applied by the sync engine: bypass the outbox
    Direct,
}

/// Storage engine behind a [`ContentStore`]
pub trait StoreBackend: Send {
    /// True for the index-less fallback engine
    fn is_degraded(&self) -> bool;

    /// Upsert records by id, atomically with their outbox entries in `Queued` mode
    fn write(&mut self, records: &[Record], mode: WriteMode) -> Result<()>;

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;

    /// Every record of a kind, tombstones included, oldest first
    fn list(&self, kind: EntityKind) -> Result<Vec<Record>>;

    fn find(&self, kind: EntityKind, index: &Index) -> Result<Vec<Record>>;

    fn queue(&self) -> Result<Vec<SyncQueueItem>>;

    fn dequeue(&mut self, ids: &[i64]) -> Result<()>;

    fn bump_retries(&mut self, ids: &[i64]) -> Result<()>;

    fn setting(&self, key: &str) -> Result<Option<String>>;

    fn set_setting(&mut self, key: &str, value: Option<&str>) -> Result<()>;

    fn append_activity(&mut self, entry: &ActivityLogEntry) -> Result<i64>;

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>>;
}

/// Thread-safe handle to the local content store.
///
/// Backend calls run on the blocking pool; the lock is held only inside
/// those calls.
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<Mutex<Box<dyn StoreBackend>>>,
    path: Option<PathBuf>,
    degraded: bool,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ContentStore")
            .field("path", &self.path)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Open the store at `path`, falling back to a JSON file beside it when
    /// the database engine is unavailable.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match SqliteBackend::open(&path) {
            Ok(backend) => Ok(Self::with_backend(Box::new(backend), Some(path))),
            Err(error) => {
                let fallback_path = fallback_path(&path);
                tracing::warn!(
                    "Storage engine unavailable at {} ({}); using fallback store {}",
                    path.display(),
                    error,
                    fallback_path.display()
                );
                let backend = FallbackBackend::open(&fallback_path).map_err(|fallback_error| {
                    Error::StorageUnavailable(format!("{error}; fallback: {fallback_error}"))
                })?;
                Ok(Self::with_backend(Box::new(backend), Some(fallback_path)))
            }
        }
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::with_backend(
            Box::new(SqliteBackend::open_in_memory()?),
            None,
        ))
    }

    /// Open the degraded fallback engine directly.
    pub async fn open_fallback(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let backend = FallbackBackend::open(path)?;
        Ok(Self::with_backend(Box::new(backend), Some(path.to_path_buf())))
    }

    pub fn with_backend(backend: Box<dyn StoreBackend>, path: Option<PathBuf>) -> Self {
        let degraded = backend.is_degraded();
        Self {
            backend: Arc::new(Mutex::new(backend)),
            path,
            degraded,
        }
    }

    /// Whether the store runs on the fallback engine
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `operation` against the backend on the blocking pool.
    async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn StoreBackend>) -> Result<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || {
            let mut backend = backend
                .lock()
                .map_err(|_| Error::Database("content store lock poisoned".to_string()))?;
            operation(&mut *backend)
        })
        .await
        .map_err(|error| Error::Database(format!("content store task failed: {error}")))?
    }

    /// Upsert a user-originated record: stamps `updatedAt = now` and
    /// `syncStatus = pending`, then enqueues it for push.
    pub async fn put(&self, mut record: Record) -> Result<Record> {
        record.touch(now_ms());
        refresh_fingerprint(&mut record);
        self.run(move |backend| {
            backend.write(std::slice::from_ref(&record), WriteMode::Queued)?;
            Ok(record)
        })
        .await
    }

    /// Write a record exactly as given, without touching the outbox.
    pub async fn put_direct(&self, record: Record) -> Result<()> {
        self.run(move |backend| backend.write(&[record], WriteMode::Direct))
            .await
    }

    /// Every record of a kind, including soft-deleted tombstones.
    pub async fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.run(move |backend| backend.list(kind)).await
    }

    pub async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.run(move |backend| backend.get(kind, &id)).await
    }

    /// Secondary index lookup; a full scan on the fallback engine.
    pub async fn get_by_index(&self, kind: EntityKind, index: &Index) -> Result<Vec<Record>> {
        let index = index.clone();
        self.run(move |backend| backend.find(kind, &index)).await
    }

    /// Soft-delete a record; projects cascade to their snippets and knowledge.
    ///
    /// Every tombstone is queued, so deletes reach the server as upserts
    /// with `isDeleted` set. Returns the number of records marked deleted.
    pub async fn soft_delete(&self, kind: EntityKind, id: &str) -> Result<usize> {
        let id = id.to_string();
        self.run(move |backend| {
            let Some(record) = backend.get(kind, &id)?.filter(|record| !record.is_deleted())
            else {
                return Ok(0);
            };

            let now = now_ms();
            let mut doomed = vec![record];
            if kind == EntityKind::Project {
                let index = Index::ProjectId(id);
                for child_kind in [EntityKind::Snippet, EntityKind::Knowledge] {
                    doomed.extend(
                        backend
                            .find(child_kind, &index)?
                            .into_iter()
                            .filter(|child| !child.is_deleted()),
                    );
                }
            }
            for record in &mut doomed {
                record.mark_deleted(now);
            }

            backend.write(&doomed, WriteMode::Queued)?;
            Ok(doomed.len())
        })
        .await
    }

    pub async fn put_project(&self, project: Project) -> Result<Project> {
        match self.put(project.into()).await? {
            Record::Project(project) => Ok(project),
            other => Err(unexpected_kind(EntityKind::Project, &other)),
        }
    }

    pub async fn put_snippet(&self, snippet: Snippet) -> Result<Snippet> {
        match self.put(snippet.into()).await? {
            Record::Snippet(snippet) => Ok(snippet),
            other => Err(unexpected_kind(EntityKind::Snippet, &other)),
        }
    }

    pub async fn put_knowledge(&self, knowledge: Knowledge) -> Result<Knowledge> {
        match self.put(knowledge.into()).await? {
            Record::Knowledge(knowledge) => Ok(knowledge),
            other => Err(unexpected_kind(EntityKind::Knowledge, &other)),
        }
    }

    /// Live project by id
    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        match self.get_by_id(EntityKind::Project, &id.as_str()).await? {
            Some(Record::Project(project)) if !project.is_deleted => Ok(Some(project)),
            _ => Ok(None),
        }
    }

    /// Live snippet by id
    pub async fn get_snippet(&self, id: &SnippetId) -> Result<Option<Snippet>> {
        match self.get_by_id(EntityKind::Snippet, &id.as_str()).await? {
            Some(Record::Snippet(snippet)) if !snippet.is_deleted => Ok(Some(snippet)),
            _ => Ok(None),
        }
    }

    /// Live knowledge item by id
    pub async fn get_knowledge(&self, id: &KnowledgeId) -> Result<Option<Knowledge>> {
        match self.get_by_id(EntityKind::Knowledge, &id.as_str()).await? {
            Some(Record::Knowledge(knowledge)) if !knowledge.is_deleted => Ok(Some(knowledge)),
            _ => Ok(None),
        }
    }

    /// Live projects, oldest first
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self
            .get_all(EntityKind::Project)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Project(project) if !project.is_deleted => Some(project),
                _ => None,
            })
            .collect())
    }

    /// Live snippets, optionally scoped to one project
    pub async fn list_snippets(&self, project_id: Option<&ProjectId>) -> Result<Vec<Snippet>> {
        Ok(self
            .live_records(EntityKind::Snippet, project_id)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Snippet(snippet) => Some(snippet),
                _ => None,
            })
            .collect())
    }

    /// Live knowledge items, optionally scoped to one project
    pub async fn list_knowledge(&self, project_id: Option<&ProjectId>) -> Result<Vec<Knowledge>> {
        Ok(self
            .live_records(EntityKind::Knowledge, project_id)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Knowledge(knowledge) => Some(knowledge),
                _ => None,
            })
            .collect())
    }

    /// Live snippets and knowledge, optionally scoped to one project
    pub async fn saved_items(&self, project_id: Option<&ProjectId>) -> Result<Vec<SavedItem>> {
        let mut items = Vec::new();
        for kind in [EntityKind::Snippet, EntityKind::Knowledge] {
            items.extend(
                self.live_records(kind, project_id)
                    .await?
                    .into_iter()
                    .filter_map(Record::into_saved_item),
            );
        }
        Ok(items)
    }

    async fn live_records(
        &self,
        kind: EntityKind,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<Record>> {
        let records = match project_id {
            Some(project_id) => {
                self.get_by_index(kind, &Index::ProjectId(project_id.as_str()))
                    .await?
            }
            None => self.get_all(kind).await?,
        };
        Ok(records
            .into_iter()
            .filter(|record| !record.is_deleted())
            .collect())
    }

    /// Return the first-run default project, creating it if needed.
    pub async fn ensure_default_project(&self) -> Result<Project> {
        let mut settings = self.load_settings().await?;
        if let Some(id) = settings
            .default_project_id
            .as_deref()
            .and_then(|id| id.parse::<ProjectId>().ok())
        {
            if let Some(project) = self.get_project(&id).await? {
                return Ok(project);
            }
        }

        let project = match self
            .list_projects()
            .await?
            .into_iter()
            .find(|project| project.name == DEFAULT_PROJECT_NAME)
        {
            Some(project) => project,
            None => {
                tracing::info!("Creating default project");
                self.put_project(Project::new(DEFAULT_PROJECT_NAME)).await?
            }
        };

        settings.default_project_id = Some(project.id.as_str());
        self.save_settings(&settings).await?;
        Ok(project)
    }

    /// Outbox contents in enqueue order
    pub async fn pending_changes(&self) -> Result<Vec<SyncQueueItem>> {
        self.run(|backend| backend.queue()).await
    }

    pub async fn queue_len(&self) -> Result<usize> {
        Ok(self.pending_changes().await?.len())
    }

    /// Remove acknowledged outbox entries
    pub async fn dequeue(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.run(move |backend| backend.dequeue(&ids)).await
    }

    pub async fn bump_retries(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.run(move |backend| backend.bump_retries(&ids)).await
    }

    pub async fn load_settings(&self) -> Result<Settings> {
        self.run(|backend| {
            let mut values = HashMap::new();
            for (key, _) in Settings::default().to_pairs() {
                if let Some(value) = backend.setting(key)? {
                    values.insert(key, value);
                }
            }
            Ok(Settings::from_lookup(|key| values.get(key).cloned()))
        })
        .await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let pairs = settings.to_pairs();
        self.run(move |backend| {
            for (key, value) in pairs {
                backend.set_setting(key, value.as_deref())?;
            }
            Ok(())
        })
        .await
    }

    /// Stable id of this installation, generated on first use
    pub async fn ensure_device_id(&self) -> Result<String> {
        let mut settings = self.load_settings().await?;
        if let Some(device_id) = settings.device_id.clone() {
            return Ok(device_id);
        }
        let device_id = uuid::Uuid::now_v7().to_string();
        settings.device_id = Some(device_id.clone());
        self.save_settings(&settings).await?;
        Ok(device_id)
    }

    pub async fn log_activity(&self, entry: &ActivityLogEntry) -> Result<i64> {
        let entry = entry.clone();
        self.run(move |backend| backend.append_activity(&entry)).await
    }

    /// Most recent activity first
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        self.run(move |backend| backend.recent_activity(limit)).await
    }
}

/// Location of the fallback file for a database path
pub fn fallback_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("fallback.json")
}

fn refresh_fingerprint(record: &mut Record) {
    match record {
        Record::Project(_) => {}
        Record::Snippet(snippet) => snippet.refresh_hash(),
        Record::Knowledge(knowledge) => knowledge.refresh_hash(),
    }
}

fn unexpected_kind(expected: EntityKind, record: &Record) -> Error {
    Error::Database(format!(
        "expected {expected} record, store returned {}",
        record.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueOperation, SyncStatus};
    use pretty_assertions::assert_eq;

    async fn stores() -> Vec<(ContentStore, Option<tempfile::TempDir>)> {
        let dir = tempfile::tempdir().unwrap();
        let fallback = ContentStore::open_fallback(dir.path().join("store.json"))
            .await
            .unwrap();
        vec![
            (ContentStore::open_in_memory().await.unwrap(), None),
            (fallback, Some(dir)),
        ]
    }

    #[tokio::test]
    async fn test_put_stamps_and_enqueues() {
        for (store, _dir) in stores().await {
            let mut project = Project::new("Backend");
            project.updated_at = 1;
            project.sync_status = SyncStatus::Synced;

            let saved = store.put_project(project.clone()).await.unwrap();
            assert!(saved.updated_at > 1);
            assert_eq!(saved.sync_status, SyncStatus::Pending);

            let queue = store.pending_changes().await.unwrap();
            assert_eq!(queue.len(), 1);
            assert_eq!(queue[0].operation, QueueOperation::Upsert);
            assert_eq!(queue[0].record, Record::Project(saved));
        }
    }

    #[tokio::test]
    async fn test_put_direct_bypasses_queue() {
        for (store, _dir) in stores().await {
            let project = Project::new("Pulled");
            store.put_direct(project.clone().into()).await.unwrap();

            assert_eq!(store.queue_len().await.unwrap(), 0);
            assert_eq!(
                store.get_project(&project.id).await.unwrap(),
                Some(project)
            );
        }
    }

    #[tokio::test]
    async fn test_get_by_index() {
        for (store, _dir) in stores().await {
            let project = store.put_project(Project::new("P")).await.unwrap();
            let other = store.put_project(Project::new("Q")).await.unwrap();
            let first = store
                .put_snippet(Snippet::new(project.id, "const x = 1;", "js"))
                .await
                .unwrap();
            store
                .put_snippet(Snippet::new(other.id, "const x = 1;", "js"))
                .await
                .unwrap();

            let by_project = store
                .get_by_index(EntityKind::Snippet, &Index::ProjectId(project.id.as_str()))
                .await
                .unwrap();
            assert_eq!(by_project, vec![Record::Snippet(first.clone())]);

            let by_hash = store
                .get_by_index(
                    EntityKind::Snippet,
                    &Index::ContentHash(first.content_hash.clone().unwrap()),
                )
                .await
                .unwrap();
            assert_eq!(by_hash.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_soft_delete_queues_tombstone() {
        for (store, _dir) in stores().await {
            let project = store.put_project(Project::new("Gone")).await.unwrap();
            let id = project.id.as_str();

            assert_eq!(store.soft_delete(EntityKind::Project, &id).await.unwrap(), 1);
            assert_eq!(store.soft_delete(EntityKind::Project, &id).await.unwrap(), 0);
            assert!(store.get_project(&project.id).await.unwrap().is_none());

            let tombstone = store.get_by_id(EntityKind::Project, &id).await.unwrap().unwrap();
            assert!(tombstone.is_deleted());

            let queue = store.pending_changes().await.unwrap();
            assert_eq!(queue.len(), 2);
            let last = queue.last().unwrap();
            assert_eq!(last.operation, QueueOperation::Upsert);
            assert!(last.outgoing().is_deleted());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_puts_from_spawned_tasks() {
        for (store, _dir) in stores().await {
            let tasks: Vec<_> = (0..6)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store.put_project(Project::new(format!("P{i}"))).await.unwrap()
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            assert_eq!(store.list_projects().await.unwrap().len(), 6);
            assert_eq!(store.queue_len().await.unwrap(), 6);
        }
    }

    #[tokio::test]
    async fn test_soft_delete_project_cascades() {
        for (store, _dir) in stores().await {
            let project = store.put_project(Project::new("P")).await.unwrap();
            store
                .put_snippet(Snippet::new(project.id, "let a = 1;", "rust"))
                .await
                .unwrap();
            store
                .put_knowledge(Knowledge::new(project.id, "Q?", "A.", vec![]))
                .await
                .unwrap();

            let deleted = store
                .soft_delete(EntityKind::Project, &project.id.as_str())
                .await
                .unwrap();
            assert_eq!(deleted, 3);
            assert!(store.list_projects().await.unwrap().is_empty());
            assert!(store.saved_items(None).await.unwrap().is_empty());

            // Tombstones stay addressable for sync
            assert_eq!(store.get_all(EntityKind::Snippet).await.unwrap().len(), 1);
            assert_eq!(store.queue_len().await.unwrap(), 6);
        }
    }

    #[tokio::test]
    async fn test_ensure_default_project_is_stable() {
        for (store, _dir) in stores().await {
            let first = store.ensure_default_project().await.unwrap();
            let second = store.ensure_default_project().await.unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(first.name, DEFAULT_PROJECT_NAME);
            assert_eq!(store.list_projects().await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_settings_and_device_id_persist() {
        for (store, _dir) in stores().await {
            let device_id = store.ensure_device_id().await.unwrap();
            assert_eq!(store.ensure_device_id().await.unwrap(), device_id);

            let mut settings = store.load_settings().await.unwrap();
            settings.last_pull_sync_version = 7;
            settings.api_base_url = None;
            store.save_settings(&settings).await.unwrap();

            let loaded = store.load_settings().await.unwrap();
            assert_eq!(loaded.last_pull_sync_version, 7);
            assert_eq!(loaded.device_id.as_deref(), Some(device_id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_open_falls_back_when_engine_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snipvault.db");
        std::fs::write(&path, b"definitely not a sqlite database file").unwrap();

        let store = ContentStore::open(&path).await.unwrap();
        assert!(store.is_degraded());
        assert_eq!(store.path(), Some(fallback_path(&path).as_path()));

        store.put_project(Project::new("Still works")).await.unwrap();
        assert_eq!(store.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_uses_sqlite_when_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path().join("nested/snipvault.db"))
            .await
            .unwrap();
        assert!(!store.is_degraded());
    }
}
