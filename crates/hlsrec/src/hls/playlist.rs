// Playlist parsing: turns a fetched media playlist into absolute, indexed segments.

use m3u8_rs::{MediaPlaylist, parse_playlist_res};
use tracing::{trace, warn};
use url::Url;

use crate::error::{RecorderError, Result};
use crate::segment::Segment;

/// The part of a media playlist snapshot the recorder acts upon.
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub media_sequence: u64,
    pub target_duration: u64,
    /// `#EXT-X-ENDLIST` was present
    pub end_list: bool,
    pub segments: Vec<Segment>,
}

/// Parses `body` as a media playlist fetched from `playlist_url`.
///
/// Segment indices are `media_sequence + position`; segment URIs are resolved
/// against the playlist URL.
pub fn parse_media_playlist(body: &[u8], playlist_url: &Url) -> Result<PlaylistSnapshot> {
    let playlist = match parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => pl,
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => {
            return Err(RecorderError::playlist(format!(
                "Expected Media Playlist, got Master for {playlist_url}"
            )));
        }
        Err(e) => {
            return Err(RecorderError::playlist(format!(
                "Failed to parse playlist {playlist_url}: {e}"
            )));
        }
    };

    Ok(snapshot_from(playlist, playlist_url))
}

fn snapshot_from(playlist: MediaPlaylist, playlist_url: &Url) -> PlaylistSnapshot {
    let mut segments = Vec::with_capacity(playlist.segments.len());

    for (position, media_segment) in playlist.segments.iter().enumerate() {
        let index = playlist.media_sequence + position as u64;
        let uri = media_segment.uri.trim();
        if uri.is_empty() {
            warn!(msn = index, "Skipping segment with empty URI");
            continue;
        }

        let url = match playlist_url.join(uri) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(msn = index, uri = %uri, error = %e, "Skipping segment with unresolvable URI");
                continue;
            }
        };
        trace!("Resolved URI: {} + {} -> {}", playlist_url, uri, url);

        segments.push(Segment::new(index, url, f64::from(media_segment.duration)));
    }

    PlaylistSnapshot {
        media_sequence: playlist.media_sequence,
        target_duration: playlist.target_duration,
        end_list: playlist.end_list,
        segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/live/index.m3u8").unwrap()
    }

    #[test]
    fn indices_follow_media_sequence() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:8\n#EXT-X-MEDIA-SEQUENCE:2680\n\
#EXTINF:7.975,\nsegment_2680.ts\n#EXTINF:7.941,\nsegment_2681.ts\n#EXTINF:7.975,\nhttps://cdn.example.com/abs.ts\n";

        let snapshot = parse_media_playlist(body.as_bytes(), &url()).unwrap();

        assert_eq!(snapshot.media_sequence, 2680);
        assert_eq!(snapshot.target_duration, 8);
        assert!(!snapshot.end_list);
        let indices: Vec<u64> = snapshot.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2680, 2681, 2682]);
        assert_eq!(
            snapshot.segments[0].url,
            "https://example.com/live/segment_2680.ts"
        );
        assert_eq!(snapshot.segments[2].url, "https://cdn.example.com/abs.ts");
        assert!((snapshot.segments[1].duration - 7.941).abs() < 1e-4);
    }

    #[test]
    fn end_list_is_reported() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:2.0,\n1.ts\n#EXT-X-ENDLIST\n";
        let snapshot = parse_media_playlist(body.as_bytes(), &url()).unwrap();
        assert!(snapshot.end_list);
        assert_eq!(snapshot.segments.len(), 1);
    }

    #[test]
    fn master_playlist_is_rejected() {
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n";
        assert!(matches!(
            parse_media_playlist(body.as_bytes(), &url()),
            Err(RecorderError::Playlist { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_media_playlist(b"<html>not a playlist</html>", &url()).is_err());
    }
}
