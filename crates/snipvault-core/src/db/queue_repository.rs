//! Sync outbox repository

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use super::repository::parse_column;
use crate::error::Result;
use crate::models::{QueueOperation, Record, SyncQueueItem};

/// `SQLite` implementation of the ordered sync outbox
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a mutation; returns its sequence number
    pub fn enqueue(
        &self,
        operation: QueueOperation,
        record: &Record,
        timestamp: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_queue (entity_kind, record_id, operation, data, timestamp, retries)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![
                record.kind().as_str(),
                record.id(),
                operation.as_str(),
                serde_json::to_string(record)?,
                timestamp,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All pending items in enqueue order
    pub fn list(&self) -> Result<Vec<SyncQueueItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, operation, data, timestamp, retries FROM sync_queue ORDER BY id ASC",
        )?;
        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Remove items by sequence number
    pub fn remove(&self, ids: &[i64]) -> Result<()> {
        let mut stmt = self.conn.prepare("DELETE FROM sync_queue WHERE id = ?")?;
        for id in ids {
            stmt.execute(params![id])?;
        }
        Ok(())
    }

    /// Count one more failed attempt for each item
    pub fn bump_retries(&self, ids: &[i64]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE sync_queue SET retries = retries + 1 WHERE id = ?")?;
        for id in ids {
            stmt.execute(params![id])?;
        }
        Ok(())
    }

    fn parse_item(row: &Row<'_>) -> rusqlite::Result<SyncQueueItem> {
        let data: String = row.get(2)?;
        let record = serde_json::from_str(&data).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(error))
        })?;
        Ok(SyncQueueItem {
            id: row.get(0)?,
            operation: parse_column(row, 1)?,
            record,
            timestamp: row.get(3)?,
            retries: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Project;

    #[test]
    fn test_enqueue_list_and_remove() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());

        let first: Record = Project::new("one").into();
        let second: Record = Project::new("two").into();
        let first_id = repo.enqueue(QueueOperation::Upsert, &first, 10).unwrap();
        let second_id = repo.enqueue(QueueOperation::Delete, &second, 20).unwrap();
        assert!(second_id > first_id);

        let items = repo.list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].record, first);
        assert_eq!(items[1].operation, QueueOperation::Delete);

        repo.remove(&[first_id]).unwrap();
        assert_eq!(repo.len().unwrap(), 1);
    }

    #[test]
    fn test_bump_retries() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());

        let id = repo
            .enqueue(QueueOperation::Upsert, &Project::new("p").into(), 1)
            .unwrap();
        repo.bump_retries(&[id]).unwrap();
        repo.bump_retries(&[id]).unwrap();

        assert_eq!(repo.list().unwrap()[0].retries, 2);
    }
}
