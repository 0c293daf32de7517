//! Settings repository implementation

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// `SQLite` key/value settings store
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Set a value; `None` removes the key
    pub fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                params![key, value],
            )?,
            None => self
                .conn
                .execute("DELETE FROM settings WHERE key = ?", params![key])?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_missing_key_is_none() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(db.connection());
        assert_eq!(repo.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_overwrite_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(db.connection());

        repo.set("device_id", Some("a")).unwrap();
        repo.set("device_id", Some("b")).unwrap();
        assert_eq!(repo.get("device_id").unwrap().as_deref(), Some("b"));

        repo.set("device_id", None).unwrap();
        assert_eq!(repo.get("device_id").unwrap(), None);
    }
}
