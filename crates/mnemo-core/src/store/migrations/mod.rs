//! Record store migrations
//!
//! SQL migrations are embedded as strings and executed when the store opens.

use rusqlite::Connection;

use crate::MemoryResult;

/// Memory tables SQL (001)
pub const MEMORY_TABLES_SQL: &str = include_str!("001_memory_tables.sql");

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> MemoryResult<()> {
    conn.execute_batch(MEMORY_TABLES_SQL)?;
    Ok(())
}
