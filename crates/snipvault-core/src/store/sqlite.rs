//! Primary `SQLite` engine for the content store

use std::path::Path;

use super::{Index, StoreBackend, WriteMode};
use crate::db::{
    Database, SqliteActivityRepository, SqliteQueueRepository, SqliteRecordRepository,
    SqliteSettingsRepository,
};
use crate::error::Result;
use crate::models::{ActivityLogEntry, EntityKind, QueueOperation, Record, SyncQueueItem};
use crate::util::now_ms;

/// Indexed store backed by [`Database`]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }
}

impl StoreBackend for SqliteBackend {
    fn is_degraded(&self) -> bool {
        false
    }

    fn write(&mut self, records: &[Record], mode: WriteMode) -> Result<()> {
        let tx = self.db.connection().unchecked_transaction()?;
        {
            let repo = SqliteRecordRepository::new(&tx);
            let queue = SqliteQueueRepository::new(&tx);
            let now = now_ms();
            for record in records {
                repo.upsert(record)?;
                if mode == WriteMode::Queued {
                    queue.enqueue(QueueOperation::Upsert, record, now)?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        SqliteRecordRepository::new(self.db.connection()).get(kind, id)
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        SqliteRecordRepository::new(self.db.connection()).list(kind)
    }

    fn find(&self, kind: EntityKind, index: &Index) -> Result<Vec<Record>> {
        let repo = SqliteRecordRepository::new(self.db.connection());
        match index {
            Index::ProjectId(project_id) => repo.list_by_project(kind, project_id),
            Index::ContentHash(hash) => repo.list_by_hash(kind, hash),
        }
    }

    fn queue(&self) -> Result<Vec<SyncQueueItem>> {
        SqliteQueueRepository::new(self.db.connection()).list()
    }

    fn dequeue(&mut self, ids: &[i64]) -> Result<()> {
        let tx = self.db.connection().unchecked_transaction()?;
        SqliteQueueRepository::new(&tx).remove(ids)?;
        tx.commit()?;
        Ok(())
    }

    fn bump_retries(&mut self, ids: &[i64]) -> Result<()> {
        let tx = self.db.connection().unchecked_transaction()?;
        SqliteQueueRepository::new(&tx).bump_retries(ids)?;
        tx.commit()?;
        Ok(())
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        SqliteSettingsRepository::new(self.db.connection()).get(key)
    }

    fn set_setting(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        SqliteSettingsRepository::new(self.db.connection()).set(key, value)
    }

    fn append_activity(&mut self, entry: &ActivityLogEntry) -> Result<i64> {
        SqliteActivityRepository::new(self.db.connection()).append(entry)
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        SqliteActivityRepository::new(self.db.connection()).recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Project, Snippet};

    #[test]
    fn test_queued_write_is_atomic_with_outbox() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        let project = Project::new("P");
        let snippet = Snippet::new(project.id, "x", "text");

        backend
            .write(&[project.into(), snippet.into()], WriteMode::Queued)
            .unwrap();

        let queue = backend.queue().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].kind(), EntityKind::Project);
        assert_eq!(queue[1].kind(), EntityKind::Snippet);
    }
}
