//! Durable Record Store
//!
//! Persistence for memory records and project contexts. The in-memory tiers,
//! the knowledge graph and the vector index are all derived from what this
//! store holds.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::MemoryResult;
use crate::types::{MemoryKind, MemoryRecord, ProjectContext};

/// Storage backend for memory records.
///
/// Implementations must make `persist` atomic per record and keyed by id:
/// persisting a record whose id already exists overwrites it.
pub trait RecordStore: Send {
    /// Write or overwrite a record.
    fn persist(&self, record: &MemoryRecord) -> MemoryResult<()>;

    /// Point lookup by id.
    fn get(&self, id: &str) -> MemoryResult<Option<MemoryRecord>>;

    /// Most recent records of one kind, newest first.
    fn load_recent(&self, kind: MemoryKind, limit: usize) -> MemoryResult<Vec<MemoryRecord>>;

    /// Every record, oldest first.
    fn load_all(&self) -> MemoryResult<Vec<MemoryRecord>>;

    /// Insert or replace the current context of a project.
    fn upsert_project_context(&self, context: &ProjectContext) -> MemoryResult<()>;

    /// Current context of a project.
    fn project_context(&self, project_name: &str) -> MemoryResult<Option<ProjectContext>>;

    /// Most recently updated project context.
    fn latest_project_context(&self) -> MemoryResult<Option<ProjectContext>>;

    /// Remove records created before `cutoff` with importance below `floor`.
    ///
    /// Returns the ids that matched; with `dry_run` nothing is deleted.
    fn sweep(&self, cutoff: DateTime<Utc>, floor: f64, dry_run: bool) -> MemoryResult<Vec<String>>;

    /// Record count per kind.
    fn count_by_kind(&self) -> MemoryResult<BTreeMap<MemoryKind, u64>>;

    /// Release the storage handle. Later calls fail with `StorageUnavailable`.
    fn close(&self) -> MemoryResult<()>;
}
