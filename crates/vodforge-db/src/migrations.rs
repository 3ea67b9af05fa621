//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use vodforge_core::{Error, Result};

/// V1: videos, transcode jobs and renditions.
const V1_INITIAL: &str = r#"
CREATE TABLE videos (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    title          TEXT NOT NULL,
    description    TEXT NOT NULL DEFAULT '',
    category       TEXT NOT NULL,
    source_path    TEXT NOT NULL,
    thumbnail_path TEXT,
    status         TEXT NOT NULL DEFAULT 'uploaded',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE transcode_jobs (
    id            TEXT PRIMARY KEY,
    video_id      INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    resolutions   TEXT NOT NULL,
    state         TEXT NOT NULL DEFAULT 'queued',
    requeue_count INTEGER NOT NULL DEFAULT 0,
    max_requeues  INTEGER NOT NULL DEFAULT 1,
    locked_by     TEXT,
    error         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT
);

-- At most one active job per video, even under concurrent enqueue.
CREATE UNIQUE INDEX idx_transcode_jobs_one_active
    ON transcode_jobs(video_id) WHERE state IN ('queued', 'running');
CREATE INDEX idx_transcode_jobs_state ON transcode_jobs(state, created_at);

CREATE TABLE renditions (
    video_id      INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    resolution    TEXT NOT NULL,
    state         TEXT NOT NULL DEFAULT 'pending',
    retry_count   INTEGER NOT NULL DEFAULT 0,
    job_id        TEXT REFERENCES transcode_jobs(id) ON DELETE SET NULL,
    manifest_path TEXT NOT NULL,
    segment_dir   TEXT NOT NULL,
    error         TEXT,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (video_id, resolution)
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn test_all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();

        for t in ["videos", "transcode_jobs", "renditions", "schema_migrations"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [t],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "table {t} should exist");
        }
    }

    #[test]
    fn test_active_job_index_exists() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master
                 WHERE type='index' AND name='idx_transcode_jobs_one_active'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
    }
}
