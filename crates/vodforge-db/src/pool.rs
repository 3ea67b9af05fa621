//! SQLite pools for the video, job and rendition store.
//!
//! Every worker claims and updates jobs through its own pooled connection, so
//! the file-backed pool runs in WAL mode and waits on a locked database
//! instead of failing the transition.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use vodforge_core::{Error, Result};

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connections per pool: request handlers plus transcode workers.
const POOL_SIZE: u32 = 8;

/// How long a writer waits for a competing transaction, in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Open (or create) the store at `db_path` and bring its schema up to date.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))
    });
    migrated(manager, "store")
}

/// Private in-memory store for unit tests.
///
/// Each pool gets its own shared-cache database name; connections of one
/// pool see the same rows, separate pools never do.
pub fn init_memory_pool() -> Result<DbPool> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_STORE: AtomicU64 = AtomicU64::new(0);
    let n = NEXT_STORE.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:vodforge_store_{n}?mode=memory&cache=shared");

    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    migrated(manager, "in-memory store")
}

fn migrated(manager: SqliteConnectionManager, what: &str) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to open {what}: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    drop(conn);

    Ok(pool)
}

/// Check out a connection, mapping pool exhaustion to [`Error::Database`].
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma(conn: &PooledConnection, name: &str) -> String {
        conn.query_row(&format!("PRAGMA {name}"), [], |row| {
            row.get::<_, rusqlite::types::Value>(0)
        })
        .map(|v| match v {
            rusqlite::types::Value::Integer(i) => i.to_string(),
            rusqlite::types::Value::Text(s) => s,
            other => format!("{other:?}"),
        })
        .unwrap()
    }

    #[test]
    fn memory_stores_are_isolated() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();

        get_conn(&a)
            .unwrap()
            .execute(
                "INSERT INTO videos (title, description, category, source_path, status, created_at, updated_at)
                 VALUES ('a', '', 'drama', '/a.mp4', 'uploaded', '2024-01-01', '2024-01-01')",
                [],
            )
            .unwrap();

        let count = |pool: &DbPool| -> i64 {
            get_conn(pool)
                .unwrap()
                .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count(&a), 1);
        assert_eq!(count(&b), 0);
    }

    #[test]
    fn memory_store_enforces_foreign_keys() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        assert_eq!(pragma(&conn, "foreign_keys"), "1");
    }

    #[test]
    fn file_store_is_migrated_and_tuned_for_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vodforge.db");
        let pool = init_pool(&path.to_string_lossy()).unwrap();
        assert_eq!(pool.max_size(), POOL_SIZE);
        let conn = get_conn(&pool).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('videos', 'transcode_jobs', 'renditions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
        assert_eq!(pragma(&conn, "journal_mode"), "wal");
        assert_eq!(pragma(&conn, "busy_timeout"), BUSY_TIMEOUT_MS.to_string());
    }
}
