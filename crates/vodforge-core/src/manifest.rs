//! Minimal HLS media playlist model.
//!
//! Renditions are flat VOD media playlists: a header, one `#EXTINF` line per
//! segment followed by the segment URI, and `#EXT-X-ENDLIST`. The pipeline
//! only needs to read back the segment URIs of a finished playlist to check
//! that every referenced file exists before promotion.

use std::fmt::Write as _;

/// One entry of a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

/// A VOD media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, duration: f64, uri: impl Into<String>) {
        self.segments.push(MediaSegment {
            duration,
            uri: uri.into(),
        });
    }

    /// Render as `.m3u8` text.
    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);
        out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
        for segment in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
            out.push_str(&segment.uri);
            out.push('\n');
        }
        out.push_str("#EXT-X-ENDLIST\n");
        out
    }
}

/// Segment URIs referenced by a playlist, in playback order.
///
/// Every non-empty line that is not a tag or comment is a URI.
pub fn segment_uris(playlist: &str) -> Vec<&str> {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Tag every segment URI with `?v={version}`.
///
/// Segment names repeat across transcodes of the same video, so served
/// playlists carry the version of the output they were promoted with.
pub fn with_segment_version(playlist: &str, version: &str) -> String {
    let mut out = String::with_capacity(playlist.len());
    for line in playlist.lines() {
        let uri = line.trim();
        if uri.is_empty() || uri.starts_with('#') {
            out.push_str(line);
        } else {
            let sep = if uri.contains('?') { '&' } else { '?' };
            let _ = write!(out, "{uri}{sep}v={version}");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_vod_playlist() {
        let mut playlist = MediaPlaylist::new(10);
        playlist.add_segment(10.0, "000.ts");
        playlist.add_segment(4.5, "001.ts");

        let text = playlist.render();
        assert!(text.starts_with("#EXTM3U\n"));
        assert!(text.contains("#EXT-X-TARGETDURATION:10"));
        assert!(text.contains("#EXTINF:4.500000,\n001.ts\n"));
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn segment_uris_from_ffmpeg_output() {
        let text = "#EXTM3U\r\n#EXT-X-VERSION:3\r\n#EXT-X-TARGETDURATION:10\r\n\
                    #EXTINF:10.010000,\r\n000.ts\r\n#EXTINF:3.2,\r\n001.ts\r\n\r\n#EXT-X-ENDLIST\r\n";
        assert_eq!(segment_uris(text), vec!["000.ts", "001.ts"]);
    }

    #[test]
    fn segment_version_only_touches_uris() {
        let mut playlist = MediaPlaylist::new(10);
        playlist.add_segment(10.0, "000.ts");
        playlist.add_segment(2.0, "001.ts");
        let text = with_segment_version(&playlist.render(), "abc");

        assert_eq!(segment_uris(&text), vec!["000.ts?v=abc", "001.ts?v=abc"]);
        assert!(text.contains("#EXTINF:10.000000,\n000.ts?v=abc\n"));
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn rendered_playlist_lists_its_segments() {
        let mut playlist = MediaPlaylist::new(10);
        playlist.add_segment(10.0, "000.ts");
        let text = playlist.render();
        assert_eq!(segment_uris(&text), vec!["000.ts"]);
    }
}
