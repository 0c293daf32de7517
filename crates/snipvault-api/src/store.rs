//! Multi-tenant server store.
//!
//! Every row carries its owning `user_id`; all reads filter by it and every
//! write is guarded by it. Record bodies are stored as JSON next to the
//! columns needed for filtering and conflict checks.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use snipvault_core::models::{EntityKind, Record};
use snipvault_core::sync::protocol::{ChangeSet, PullQuery, PullResponse, PushRequest};

use crate::error::AppError;

const CURRENT_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    sync_version INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_projects_user_version ON projects(user_id, sync_version);

CREATE TABLE IF NOT EXISTS snippets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    sync_version INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_snippets_user_version ON snippets(user_id, sync_version);
CREATE INDEX IF NOT EXISTS idx_snippets_project ON snippets(user_id, project_id);

CREATE TABLE IF NOT EXISTS knowledge (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    sync_version INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_knowledge_user_version ON knowledge(user_id, sync_version);
CREATE INDEX IF NOT EXISTS idx_knowledge_project ON knowledge(user_id, project_id);

CREATE TABLE IF NOT EXISTS sync_sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 0,
    last_sync_at INTEGER NOT NULL,
    UNIQUE(user_id, device_id)
);
";

/// What a push committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub sync_version: i64,
    /// Ids of items dropped for referencing projects the user does not own
    pub invalid_refs: Vec<String>,
    pub written: usize,
}

/// Shared handle; every query runs on the blocking pool.
#[derive(Clone)]
pub struct ServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl ServerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                AppError::internal(format!("create {}: {error}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    {
        let shared = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = shared
                .lock()
                .map_err(|_| AppError::internal("server store lock poisoned"))?;
            operation(&mut *conn)
        })
        .await
        .map_err(|error| AppError::internal(format!("server store task failed: {error}")))?
    }

    /// Apply a push atomically under a new sync version.
    ///
    /// Items whose project cannot be validated are skipped and reported; the
    /// rest commit together with the device session.
    pub async fn push(&self, user_id: &str, request: PushRequest) -> Result<PushOutcome, AppError> {
        let user_id = user_id.to_string();
        self.run(move |conn| apply_push(conn, &user_id, &request)).await
    }

    /// Rows changed after `since`, optionally scoped to one project.
    ///
    /// With a device id, that device's session is advanced to the returned
    /// version.
    pub async fn pull(&self, user_id: &str, query: &PullQuery) -> Result<PullResponse, AppError> {
        let user_id = user_id.to_string();
        let query = query.clone();
        self.run(move |conn| read_changes(conn, &user_id, &query)).await
    }

    /// Last acknowledged version for one device
    #[cfg(test)]
    pub async fn session_version(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<i64>, AppError> {
        let user_id = user_id.to_string();
        let device_id = device_id.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT sync_version FROM sync_sessions WHERE user_id = ?1 AND device_id = ?2",
                    params![user_id, device_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }
}

fn apply_push(
    conn: &mut Connection,
    user_id: &str,
    request: &PushRequest,
) -> Result<PushOutcome, AppError> {
    let tx = conn.transaction()?;

    let sync_version = max_session_version(&tx, user_id)? + 1;
    let now = chrono::Utc::now().timestamp_millis();
    upsert_session(&tx, user_id, &request.device_id, sync_version, now)?;

    let mut invalid_refs = Vec::new();
    let mut writable_projects = HashSet::new();
    let mut written = 0;

    for project in &request.changes.projects {
        let id = project.id.as_str();
        if owned_by_other(&tx, "projects", &id, user_id)? {
            invalid_refs.push(id);
            continue;
        }
        writable_projects.insert(id);
        written += write_record(&tx, user_id, Record::Project(project.clone()), sync_version)?;
    }

    let children = request
        .changes
        .snippets
        .iter()
        .cloned()
        .map(Record::from)
        .chain(request.changes.knowledge.iter().cloned().map(Record::from));
    for record in children {
        let id = record.id();
        let project_id = record.project_id().unwrap_or_default();
        let valid_parent = writable_projects.contains(&project_id)
            || owns_project(&tx, user_id, &project_id)?;
        if !valid_parent || owned_by_other(&tx, table(record.kind()), &id, user_id)? {
            invalid_refs.push(id);
            continue;
        }
        written += write_record(&tx, user_id, record, sync_version)?;
    }

    tx.commit()?;
    Ok(PushOutcome {
        sync_version,
        invalid_refs,
        written,
    })
}

fn read_changes(
    conn: &Connection,
    user_id: &str,
    query: &PullQuery,
) -> Result<PullResponse, AppError> {
    let project_id = query
        .project_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(project_id) = project_id {
        if !owns_project(conn, user_id, project_id)? {
            return Err(AppError::not_found(format!("project {project_id}")));
        }
    }

    let changes = ChangeSet {
        projects: changed_rows(conn, EntityKind::Project, user_id, query.since, project_id)?,
        snippets: changed_rows(conn, EntityKind::Snippet, user_id, query.since, project_id)?,
        knowledge: changed_rows(conn, EntityKind::Knowledge, user_id, query.since, project_id)?,
    };

    let sync_version = max_session_version(conn, user_id)?;
    if let Some(device_id) = query.device_id.as_deref().filter(|id| !id.trim().is_empty()) {
        upsert_session(
            conn,
            user_id,
            device_id,
            sync_version,
            chrono::Utc::now().timestamp_millis(),
        )?;
    }

    Ok(PullResponse {
        sync_version,
        changes,
    })
}

fn migrate(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);")?;
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    if version < CURRENT_VERSION {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(SCHEMA_V1)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [CURRENT_VERSION])?;
        tx.commit()?;
        tracing::info!("Migrated server database to version {CURRENT_VERSION}");
    }
    Ok(())
}

const fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Project => "projects",
        EntityKind::Snippet => "snippets",
        EntityKind::Knowledge => "knowledge",
    }
}

fn max_session_version(conn: &Connection, user_id: &str) -> Result<i64, AppError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(sync_version), 0) FROM sync_sessions WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?)
}

fn upsert_session(
    conn: &Connection,
    user_id: &str,
    device_id: &str,
    sync_version: i64,
    now: i64,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO sync_sessions (id, user_id, device_id, sync_version, last_sync_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, device_id) DO UPDATE SET
             sync_version = MAX(sync_sessions.sync_version, excluded.sync_version),
             last_sync_at = excluded.last_sync_at",
        params![
            uuid::Uuid::now_v7().to_string(),
            user_id,
            device_id,
            sync_version,
            now
        ],
    )?;
    Ok(())
}

fn owns_project(conn: &Connection, user_id: &str, project_id: &str) -> Result<bool, AppError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1 AND user_id = ?2)",
        params![project_id, user_id],
        |row| row.get(0),
    )?)
}

fn owned_by_other(
    conn: &Connection,
    table: &str,
    id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    Ok(conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1 AND user_id != ?2)"),
        params![id, user_id],
        |row| row.get(0),
    )?)
}

/// Upsert guarded by ownership and last-write-wins on `updatedAt`; equal
/// timestamps overwrite so retried pushes stay idempotent. Returns rows written.
fn write_record(
    tx: &Transaction<'_>,
    user_id: &str,
    mut record: Record,
    sync_version: i64,
) -> Result<usize, AppError> {
    stamp_version(&mut record, sync_version);
    let kind = record.kind();
    let data = match &record {
        Record::Project(project) => serde_json::to_string(project)?,
        Record::Snippet(snippet) => serde_json::to_string(snippet)?,
        Record::Knowledge(knowledge) => serde_json::to_string(knowledge)?,
    };

    let written = if kind == EntityKind::Project {
        tx.execute(
            "INSERT INTO projects (id, user_id, data, updated_at, sync_version, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 data = excluded.data,
                 updated_at = excluded.updated_at,
                 sync_version = excluded.sync_version,
                 is_deleted = excluded.is_deleted
             WHERE projects.user_id = excluded.user_id
               AND excluded.updated_at >= projects.updated_at",
            params![
                record.id(),
                user_id,
                data,
                record.updated_at(),
                sync_version,
                record.is_deleted()
            ],
        )?
    } else {
        let table = table(kind);
        tx.execute(
            &format!(
                "INSERT INTO {table}
                     (id, user_id, project_id, data, updated_at, sync_version, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     project_id = excluded.project_id,
                     data = excluded.data,
                     updated_at = excluded.updated_at,
                     sync_version = excluded.sync_version,
                     is_deleted = excluded.is_deleted
                 WHERE {table}.user_id = excluded.user_id
                   AND excluded.updated_at >= {table}.updated_at"
            ),
            params![
                record.id(),
                user_id,
                record.project_id(),
                data,
                record.updated_at(),
                sync_version,
                record.is_deleted()
            ],
        )?
    };
    Ok(written)
}

fn stamp_version(record: &mut Record, sync_version: i64) {
    match record {
        Record::Project(project) => project.sync_version = sync_version,
        Record::Snippet(snippet) => snippet.sync_version = sync_version,
        Record::Knowledge(knowledge) => knowledge.sync_version = sync_version,
    }
}

fn changed_rows<T: DeserializeOwned>(
    conn: &Connection,
    kind: EntityKind,
    user_id: &str,
    since: i64,
    project_id: Option<&str>,
) -> Result<Vec<T>, AppError> {
    let scope = match (kind, project_id) {
        (_, None) => "",
        (EntityKind::Project, Some(_)) => " AND id = ?3",
        (_, Some(_)) => " AND project_id = ?3",
    };
    let sql = format!(
        "SELECT data FROM {} WHERE user_id = ?1 AND sync_version > ?2{scope}
         ORDER BY sync_version, id",
        table(kind)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<String> = match project_id {
        Some(project_id) => stmt
            .query_map(params![user_id, since, project_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?,
        None => stmt
            .query_map(params![user_id, since], |row| row.get(0))?
            .collect::<Result<_, _>>()?,
    };
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(AppError::from))
        .collect()
}
