//! Activity log repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection, Row};

use super::repository::parse_column;
use crate::error::Result;
use crate::models::ActivityLogEntry;

/// `SQLite` append-only activity log
pub struct SqliteActivityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteActivityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn append(&self, entry: &ActivityLogEntry) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO activity_log (
                timestamp, action, item_type, item_id, project_id, source, content_hash,
                platform, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.timestamp,
                entry.action.as_str(),
                entry.item_type.as_str(),
                entry.item_id,
                entry.project_id,
                entry.source,
                entry.content_hash,
                entry.platform,
                serde_json::to_string(&entry.metadata)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, action, item_type, item_id, project_id, source, content_hash,
                    platform, metadata
             FROM activity_log
             ORDER BY id DESC
             LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<ActivityLogEntry> {
        let metadata: String = row.get(9)?;
        Ok(ActivityLogEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            action: parse_column(row, 2)?,
            item_type: parse_column(row, 3)?,
            item_id: row.get(4)?,
            project_id: row.get(5)?,
            source: row.get(6)?,
            content_hash: row.get(7)?,
            platform: row.get(8)?,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }
}
