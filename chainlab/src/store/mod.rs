// chainlab/src/store/mod.rs
//!
//! Local SQLite store for applications and run history.

pub mod applications;
pub mod migrations;
pub mod runs;

use crate::{DbPool, Error};
use anyhow::Context;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

/// Applies every pending schema step.
pub fn migrate_db(conn: &mut Connection) -> Result<(), Error> {
    let applied = migrations::apply(conn)?;
    if applied > 0 {
        tracing::debug!(applied, version = migrations::latest_version(), "schema migrated");
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i64, Error> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Opens (creating if needed) the database file and migrates it.
pub fn open_pool(path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;"));
    let pool = r2d2::Pool::builder()
        .max_size(4)
        .build(manager)
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    {
        let mut conn = pool.get()?;
        migrate_db(&mut conn).context("Failed to migrate database")?;
    }
    tracing::debug!(path = %path.display(), "database ready");
    Ok(pool)
}

/// Single-connection in-memory database, migrated; used by tests and dry runs.
pub fn memory_pool() -> Result<DbPool, Error> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    {
        let mut conn = pool.get()?;
        migrate_db(&mut conn)?;
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_reach_latest_version() -> anyhow::Result<()> {
        let pool = memory_pool()?;
        let conn = pool.get()?;
        assert_eq!(schema_version(&conn)?, migrations::latest_version());

        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('applications', 'runs', 'run_outputs')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 3);
        Ok(())
    }

    #[test]
    fn file_pool_creates_parent_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("chainlab.sqlite3");

        let pool = open_pool(&path)?;
        assert!(path.exists());
        assert_eq!(schema_version(&*pool.get()?)?, migrations::latest_version());

        // Reopening an up-to-date database is a no-op.
        drop(pool);
        open_pool(&path)?;
        Ok(())
    }
}
