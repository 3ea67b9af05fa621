//! Read path for HLS renditions.
//!
//! [`DeliveryService`] resolves manifests and segments through the
//! [`AssetLayout`] and serves them only when the rendition is `ready`.
//! Readiness comes from the database, never from what happens to be on
//! disk, so staged or half-promoted output is unreachable.
//!
//! Authentication is decided by the caller: every operation takes an
//! [`Authenticated`] capability and does no credential checks of its own.

use tokio::fs::File;
use vodforge_core::manifest;
use vodforge_core::{AssetLayout, Error, Resolution, Result, VideoId};
use vodforge_db::models::Rendition;
use vodforge_db::pool::{get_conn, DbPool};
use vodforge_db::queries::renditions;

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Proof that the caller has been authenticated by the surrounding
/// application. Holding one is the only requirement for reading assets.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated {
    _private: (),
}

impl Authenticated {
    /// Assert that the current caller is authenticated.
    pub fn granted() -> Self {
        Self { _private: () }
    }
}

/// A rendition playlist ready to send.
#[derive(Debug)]
pub struct ManifestBody {
    pub body: String,
    pub content_type: &'static str,
}

/// An open segment file ready to stream.
#[derive(Debug)]
pub struct SegmentFile {
    pub file: File,
    pub len: u64,
    pub content_type: &'static str,
}

#[derive(Clone)]
pub struct DeliveryService {
    db: DbPool,
    layout: AssetLayout,
}

impl DeliveryService {
    pub fn new(db: DbPool, layout: AssetLayout) -> Self {
        Self { db, layout }
    }

    /// Fetch the playlist of `(video_id, resolution)`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownResolution`] for labels outside the supported set.
    /// - [`Error::NotReady`] unless the rendition is `ready`.
    /// - [`Error::NotFound`] if a ready rendition has no playlist on disk.
    pub async fn get_manifest(
        &self,
        _auth: &Authenticated,
        video_id: VideoId,
        resolution: &str,
    ) -> Result<ManifestBody> {
        let resolution: Resolution = resolution.parse()?;
        let rendition = self.ensure_ready(video_id, resolution)?;

        let path = self.layout.manifest_path(video_id, resolution);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| missing_as_not_found(e, "manifest", video_id, resolution.label()))?;
        // Versioned by the job that promoted this output.
        let body = match rendition.job_id {
            Some(job_id) => manifest::with_segment_version(&body, &job_id.to_string()),
            None => body,
        };

        Ok(ManifestBody {
            body,
            content_type: MANIFEST_CONTENT_TYPE,
        })
    }

    /// Open one segment of `(video_id, resolution)` for streaming.
    ///
    /// The segment name is validated before any database or filesystem
    /// access.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSegmentName`] if the name is outside the grammar.
    /// - [`Error::UnknownResolution`] for labels outside the supported set.
    /// - [`Error::NotReady`] unless the rendition is `ready`.
    /// - [`Error::NotFound`] if the segment does not exist.
    pub async fn get_segment(
        &self,
        _auth: &Authenticated,
        video_id: VideoId,
        resolution: &str,
        segment_name: &str,
    ) -> Result<SegmentFile> {
        vodforge_core::layout::validate_segment_name(segment_name)?;
        let resolution: Resolution = resolution.parse()?;
        let path = self.layout.segment_path(video_id, resolution, segment_name)?;
        self.ensure_ready(video_id, resolution)?;

        let file = File::open(&path)
            .await
            .map_err(|e| missing_as_not_found(e, "segment", video_id, segment_name))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::not_found("segment", format!("{video_id}/{segment_name}")));
        }

        Ok(SegmentFile {
            file,
            len: metadata.len(),
            content_type: SEGMENT_CONTENT_TYPE,
        })
    }

    fn ensure_ready(&self, video_id: VideoId, resolution: Resolution) -> Result<Rendition> {
        let conn = get_conn(&self.db)?;
        match renditions::get_rendition(&conn, video_id, resolution)? {
            Some(r) if r.is_ready() => Ok(r),
            _ => Err(Error::NotReady {
                video_id,
                resolution,
            }),
        }
    }
}

fn missing_as_not_found(e: std::io::Error, entity: &str, video_id: VideoId, name: &str) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found(entity, format!("{video_id}/{name}"))
    } else {
        Error::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodforge_core::JobId;
    use vodforge_db::models::NewVideo;
    use vodforge_db::pool::init_memory_pool;
    use vodforge_db::queries::{transcode_jobs, videos};
    use vodforge_core::VideoCategory;

    struct Fixture {
        service: DeliveryService,
        layout: AssetLayout,
        db: DbPool,
        video_id: VideoId,
        job_id: JobId,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = AssetLayout::new(dir.path());
        let db = init_memory_pool().unwrap();
        let conn = db.get().unwrap();
        let video_id = videos::create_video(
            &conn,
            &NewVideo {
                title: "Clip",
                description: "",
                category: VideoCategory::Romance,
                source_path: "/uploads/clip.mp4",
                thumbnail_path: None,
            },
        )
        .unwrap()
        .id;
        let job_id = transcode_jobs::create_job(&conn, video_id, &[Resolution::P480], 1)
            .unwrap()
            .id;
        renditions::reset_for_job(&conn, job_id, video_id, Resolution::P480, "m", "d").unwrap();

        let base = layout.base_path(video_id, Resolution::P480);
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("index.m3u8"), "#EXTM3U\n000.ts\n").unwrap();
        std::fs::write(base.join("000.ts"), vec![0x47u8; 188]).unwrap();

        Fixture {
            service: DeliveryService::new(db.clone(), layout.clone()),
            layout,
            db,
            video_id,
            job_id,
            _dir: dir,
        }
    }

    fn mark_ready(f: &Fixture) {
        let conn = f.db.get().unwrap();
        renditions::mark_ready(&conn, f.job_id, f.video_id, Resolution::P480).unwrap();
    }

    #[tokio::test]
    async fn manifest_not_ready_even_if_file_exists() {
        let f = fixture();
        let auth = Authenticated::granted();
        assert!(f.layout.manifest_path(f.video_id, Resolution::P480).exists());

        let err = f.service.get_manifest(&auth, f.video_id, "480p").await.unwrap_err();
        assert!(matches!(err, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn ready_manifest_is_served() {
        let f = fixture();
        mark_ready(&f);
        let m = f
            .service
            .get_manifest(&Authenticated::granted(), f.video_id, "480p")
            .await
            .unwrap();
        assert_eq!(m.content_type, "application/vnd.apple.mpegurl");
        assert!(m.body.contains(&format!("000.ts?v={}\n", f.job_id)));
    }

    #[tokio::test]
    async fn unknown_resolution_rejected() {
        let f = fixture();
        let err = f
            .service
            .get_manifest(&Authenticated::granted(), f.video_id, "4k")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResolution(_)));
    }

    #[tokio::test]
    async fn segment_served_with_length() {
        let f = fixture();
        mark_ready(&f);
        let s = f
            .service
            .get_segment(&Authenticated::granted(), f.video_id, "480p", "000.ts")
            .await
            .unwrap();
        assert_eq!(s.len, 188);
        assert_eq!(s.content_type, "video/mp2t");
    }

    #[tokio::test]
    async fn traversal_rejected_before_readiness() {
        let f = fixture();
        // Not ready, unknown resolution: the name check still wins.
        let err = f
            .service
            .get_segment(&Authenticated::granted(), f.video_id, "bogus", "../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSegmentName));
    }

    #[tokio::test]
    async fn missing_segment_is_not_found() {
        let f = fixture();
        mark_ready(&f);
        let err = f
            .service
            .get_segment(&Authenticated::granted(), f.video_id, "480p", "999.ts")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn segment_of_unready_rendition_is_not_ready() {
        let f = fixture();
        let err = f
            .service
            .get_segment(&Authenticated::granted(), f.video_id, "480p", "000.ts")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotReady { .. }));
    }
}
