//! Video catalogue operations.

use chrono::Utc;
use rusqlite::Connection;
use vodforge_core::{Error, Result, VideoId};

use crate::models::{NewVideo, Video};

const COLS: &str = "id, title, description, category, source_path, thumbnail_path,
    status, created_at, updated_at";

/// Register a new video in `uploaded` state.
pub fn create_video(conn: &Connection, new: &NewVideo<'_>) -> Result<Video> {
    let now = Utc::now().to_rfc3339();
    let q = format!(
        "INSERT INTO videos (title, description, category, source_path, thumbnail_path,
            status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'uploaded', ?6, ?6)
         RETURNING {COLS}"
    );
    conn.query_row(
        &q,
        rusqlite::params![
            new.title,
            new.description,
            new.category.as_str(),
            new.source_path,
            new.thumbnail_path,
            &now
        ],
        Video::from_row,
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a video by ID.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE id = ?1");
    let result = conn.query_row(&q, [id.as_i64()], Video::from_row);
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List videos, newest first.
pub fn list_videos(conn: &Connection, offset: i64, limit: i64) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![limit, offset], Video::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a video together with its jobs and renditions.
pub fn delete_video(conn: &Connection, id: VideoId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM videos WHERE id = ?1", [id.as_i64()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use vodforge_core::{VideoCategory, VideoStatus};

    fn sample<'a>(title: &'a str) -> NewVideo<'a> {
        NewVideo {
            title,
            description: "A test upload",
            category: VideoCategory::Drama,
            source_path: "/uploads/source.mp4",
            thumbnail_path: None,
        }
    }

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let video = create_video(&conn, &sample("First")).unwrap();
        assert_eq!(video.status, VideoStatus::Uploaded);
        assert_eq!(video.category, VideoCategory::Drama);

        let fetched = get_video(&conn, video.id).unwrap().unwrap();
        assert_eq!(fetched.title, "First");
        assert_eq!(fetched.source_path, "/uploads/source.mp4");
    }

    #[test]
    fn get_missing_returns_none() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(get_video(&conn, VideoId::from(999)).unwrap().is_none());
    }

    #[test]
    fn list_newest_first() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_video(&conn, &sample("a")).unwrap();
        let b = create_video(&conn, &sample("b")).unwrap();

        let listed = list_videos(&conn, 0, 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let video = create_video(&conn, &sample("x")).unwrap();

        assert!(delete_video(&conn, video.id).unwrap());
        assert!(!delete_video(&conn, video.id).unwrap());
        assert!(get_video(&conn, video.id).unwrap().is_none());
    }
}
