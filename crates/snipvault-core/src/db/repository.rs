//! Record repository: typed rows for projects, snippets and knowledge

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{EntityKind, Knowledge, Project, Record, Snippet};

const PROJECT_COLUMNS: &str =
    "id, name, description, created_at, updated_at, sync_version, is_deleted, sync_status";
const SNIPPET_COLUMNS: &str = "id, project_id, code, language, description, source, content_hash, \
     created_at, updated_at, sync_version, is_deleted, sync_status";
const KNOWLEDGE_COLUMNS: &str = "id, project_id, question, answer, source, tags, content_hash, \
     created_at, updated_at, sync_version, is_deleted, sync_status";

/// `SQLite` access to the three record tables.
///
/// Reads return soft-deleted rows too; callers decide what is user-facing.
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a record by id
    pub fn upsert(&self, record: &Record) -> Result<()> {
        match record {
            Record::Project(project) => {
                self.conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO projects ({PROJECT_COLUMNS})
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    params![
                        project.id.as_str(),
                        project.name,
                        project.description,
                        project.created_at,
                        project.updated_at,
                        project.sync_version,
                        i32::from(project.is_deleted),
                        project.sync_status.as_str(),
                    ],
                )?;
            }
            Record::Snippet(snippet) => {
                self.conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO snippets ({SNIPPET_COLUMNS})
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    params![
                        snippet.id.as_str(),
                        snippet.project_id.as_str(),
                        snippet.code,
                        snippet.language,
                        snippet.description,
                        snippet.source,
                        snippet.content_hash,
                        snippet.created_at,
                        snippet.updated_at,
                        snippet.sync_version,
                        i32::from(snippet.is_deleted),
                        snippet.sync_status.as_str(),
                    ],
                )?;
            }
            Record::Knowledge(knowledge) => {
                self.conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO knowledge ({KNOWLEDGE_COLUMNS})
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    params![
                        knowledge.id.as_str(),
                        knowledge.project_id.as_str(),
                        knowledge.question,
                        knowledge.answer,
                        knowledge.source,
                        serde_json::to_string(&knowledge.tags)?,
                        knowledge.content_hash,
                        knowledge.created_at,
                        knowledge.updated_at,
                        knowledge.sync_version,
                        i32::from(knowledge.is_deleted),
                        knowledge.sync_status.as_str(),
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Get a record by id
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let sql = format!("{} WHERE id = ?", select_sql(kind));
        let record = self
            .conn
            .query_row(&sql, params![id], |row| parse_record(kind, row))
            .optional()?;
        Ok(record)
    }

    /// List every record of a kind, oldest first
    pub fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let sql = format!("{} ORDER BY created_at ASC, id ASC", select_sql(kind));
        self.query(kind, &sql, params![])
    }

    /// Records owned by a project (uses the `project_id` index)
    pub fn list_by_project(&self, kind: EntityKind, project_id: &str) -> Result<Vec<Record>> {
        if kind == EntityKind::Project {
            return Ok(self.get(kind, project_id)?.into_iter().collect());
        }
        let sql = format!(
            "{} WHERE project_id = ? ORDER BY created_at ASC, id ASC",
            select_sql(kind)
        );
        self.query(kind, &sql, params![project_id])
    }

    /// Records with a fingerprint (uses the `content_hash` index)
    pub fn list_by_hash(&self, kind: EntityKind, content_hash: &str) -> Result<Vec<Record>> {
        if kind == EntityKind::Project {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE content_hash = ? ORDER BY created_at ASC, id ASC",
            select_sql(kind)
        );
        self.query(kind, &sql, params![content_hash])
    }

    fn query(
        &self,
        kind: EntityKind,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, |row| parse_record(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

const fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Project => "projects",
        EntityKind::Snippet => "snippets",
        EntityKind::Knowledge => "knowledge",
    }
}

fn select_sql(kind: EntityKind) -> String {
    let columns = match kind {
        EntityKind::Project => PROJECT_COLUMNS,
        EntityKind::Snippet => SNIPPET_COLUMNS,
        EntityKind::Knowledge => KNOWLEDGE_COLUMNS,
    };
    format!("SELECT {columns} FROM {}", table(kind))
}

fn parse_record(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(match kind {
        EntityKind::Project => Record::Project(parse_project(row)?),
        EntityKind::Snippet => Record::Snippet(parse_snippet(row)?),
        EntityKind::Knowledge => Record::Knowledge(parse_knowledge(row)?),
    })
}

/// Parse a text column through `FromStr`, surfacing failures as conversion errors
pub(crate) fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

fn parse_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        sync_version: row.get(5)?,
        is_deleted: row.get::<_, i32>(6)? != 0,
        sync_status: parse_column(row, 7)?,
    })
}

fn parse_snippet(row: &Row<'_>) -> rusqlite::Result<Snippet> {
    Ok(Snippet {
        id: parse_column(row, 0)?,
        project_id: parse_column(row, 1)?,
        code: row.get(2)?,
        language: row.get(3)?,
        description: row.get(4)?,
        source: row.get(5)?,
        content_hash: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        sync_version: row.get(9)?,
        is_deleted: row.get::<_, i32>(10)? != 0,
        sync_status: parse_column(row, 11)?,
    })
}

fn parse_knowledge(row: &Row<'_>) -> rusqlite::Result<Knowledge> {
    let tags_json: String = row.get(5)?;
    let tags = serde_json::from_str(&tags_json).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(error))
    })?;

    Ok(Knowledge {
        id: parse_column(row, 0)?,
        project_id: parse_column(row, 1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        source: row.get(4)?,
        tags,
        content_hash: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        sync_version: row.get(9)?,
        is_deleted: row.get::<_, i32>(10)? != 0,
        sync_status: parse_column(row, 11)?,
    })
}
