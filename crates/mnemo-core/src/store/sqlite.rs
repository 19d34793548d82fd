//! SQLite record store.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::RecordStore;
use super::migrations::run_migrations;
use crate::types::{MemoryKind, MemoryRecord, ProjectContext, RecordAttributes};
use crate::{MemoryError, MemoryResult};

const RECORD_COLUMNS: &str =
    "id, content, created_at, kind, importance, tags_json, attributes_json";

/// Record store backed by a single SQLite connection.
///
/// Thread-safe via internal Mutex. The connection is dropped on `close`;
/// every call after that fails with `StorageUnavailable`.
pub struct SqliteRecordStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and apply migrations
    pub fn open(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        info!(path = %path.display(), "Opened record store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// In-memory database, for tests and ephemeral engines
    pub fn in_memory() -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> MemoryResult<T>) -> MemoryResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| MemoryError::storage("record store lock poisoned"))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| MemoryError::storage("record store is closed"))?;
        f(conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

struct RecordRow {
    id: String,
    content: String,
    created_at: i64,
    kind: String,
    importance: f64,
    tags_json: String,
    attributes_json: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            created_at: row.get(2)?,
            kind: row.get(3)?,
            importance: row.get(4)?,
            tags_json: row.get(5)?,
            attributes_json: row.get(6)?,
        })
    }

    fn into_record(self) -> MemoryResult<MemoryRecord> {
        let kind = MemoryKind::from_str(&self.kind).ok_or_else(|| {
            MemoryError::storage(format!("invalid kind '{}' on record {}", self.kind, self.id))
        })?;
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags_json)?;
        let attributes = RecordAttributes::from_json(kind, &self.attributes_json)?;

        Ok(MemoryRecord::from_parts(
            self.id,
            self.content,
            from_micros(self.created_at)?,
            kind,
            self.importance,
            tags,
            attributes,
        ))
    }
}

fn from_micros(micros: i64) -> MemoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| MemoryError::storage(format!("timestamp out of range: {}", micros)))
}

fn collect_records(rows: Vec<RecordRow>) -> MemoryResult<Vec<MemoryRecord>> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, String, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_project(
    (project_name, tech_stack, context_json, created_at, updated_at): (
        String,
        Option<String>,
        String,
        i64,
        i64,
    ),
) -> MemoryResult<ProjectContext> {
    Ok(ProjectContext {
        project_name,
        tech_stack,
        context_data: serde_json::from_str(&context_json)?,
        created_at: from_micros(created_at)?,
        updated_at: from_micros(updated_at)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordStore
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore for SqliteRecordStore {
    fn persist(&self, record: &MemoryRecord) -> MemoryResult<()> {
        let tags_json = serde_json::to_string(&record.tags)?;
        let attributes_json = record.attributes.to_json()?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, content, created_at, kind, importance, tags_json, attributes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    created_at = excluded.created_at,
                    kind = excluded.kind,
                    importance = excluded.importance,
                    tags_json = excluded.tags_json,
                    attributes_json = excluded.attributes_json",
                params![
                    &record.id,
                    &record.content,
                    record.created_at.timestamp_micros(),
                    record.kind.as_str(),
                    record.importance,
                    tags_json,
                    attributes_json,
                ],
            )?;
            debug!(id = %record.id, kind = %record.kind, "Persisted record");
            Ok(())
        })
    }

    fn get(&self, id: &str) -> MemoryResult<Option<MemoryRecord>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM memories WHERE id = ?1", RECORD_COLUMNS),
                    params![id],
                    RecordRow::from_row,
                )
                .optional()?)
        })?;
        row.map(RecordRow::into_record).transpose()
    }

    fn load_recent(&self, kind: MemoryKind, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM memories WHERE kind = ?1
                 ORDER BY created_at DESC, id ASC LIMIT ?2",
                RECORD_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![kind.as_str(), limit as i64], RecordRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        collect_records(rows)
    }

    fn load_all(&self) -> MemoryResult<Vec<MemoryRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM memories ORDER BY created_at ASC, id ASC",
                RECORD_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], RecordRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        collect_records(rows)
    }

    fn upsert_project_context(&self, context: &ProjectContext) -> MemoryResult<()> {
        let context_json = serde_json::to_string(&context.context_data)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project_contexts (project_name, tech_stack, context_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(project_name) DO UPDATE SET
                    tech_stack = excluded.tech_stack,
                    context_json = excluded.context_json,
                    updated_at = excluded.updated_at",
                params![
                    &context.project_name,
                    &context.tech_stack,
                    context_json,
                    context.created_at.timestamp_micros(),
                    context.updated_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
    }

    fn project_context(&self, project_name: &str) -> MemoryResult<Option<ProjectContext>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT project_name, tech_stack, context_json, created_at, updated_at
                     FROM project_contexts WHERE project_name = ?1",
                    params![project_name],
                    row_to_project,
                )
                .optional()?)
        })?;
        row.map(into_project).transpose()
    }

    fn latest_project_context(&self) -> MemoryResult<Option<ProjectContext>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT project_name, tech_stack, context_json, created_at, updated_at
                     FROM project_contexts ORDER BY updated_at DESC, project_name ASC LIMIT 1",
                    [],
                    row_to_project,
                )
                .optional()?)
        })?;
        row.map(into_project).transpose()
    }

    fn sweep(&self, cutoff: DateTime<Utc>, floor: f64, dry_run: bool) -> MemoryResult<Vec<String>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM memories WHERE created_at < ?1 AND importance < ?2
                     ORDER BY created_at ASC, id ASC",
                )?;
                stmt.query_map(params![cutoff.timestamp_micros(), floor], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?
            };

            if !dry_run && !ids.is_empty() {
                tx.execute(
                    "DELETE FROM memories WHERE created_at < ?1 AND importance < ?2",
                    params![cutoff.timestamp_micros(), floor],
                )?;
            }
            tx.commit()?;
            Ok(ids)
        })
    }

    fn count_by_kind(&self) -> MemoryResult<BTreeMap<MemoryKind, u64>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM memories GROUP BY kind")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut counts = BTreeMap::new();
        for (kind, count) in rows {
            if let Some(kind) = MemoryKind::from_str(&kind) {
                counts.insert(kind, count as u64);
            }
        }
        Ok(counts)
    }

    fn close(&self) -> MemoryResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| MemoryError::storage("record store lock poisoned"))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| MemoryError::from(e))?;
            info!("Closed record store");
        }
        Ok(())
    }
}
