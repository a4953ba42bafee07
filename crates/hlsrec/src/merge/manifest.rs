use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::merge::runs::PlaylistRun;

/// Name of the local playlist written for `run`.
pub fn manifest_file_name(run: &PlaylistRun) -> String {
    format!("{}.m3u8", run.file_stem())
}

/// Renders a standalone VOD playlist for `run`, referencing segment files by
/// their name relative to the playlist.
pub fn render_manifest(run: &PlaylistRun) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64 + run.len() * 32);
    writeln!(out, "#EXTM3U")?;
    writeln!(out, "#EXT-X-VERSION:3")?;
    writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD")?;
    writeln!(out, "#EXT-X-TARGETDURATION:{}", run.target_duration())?;
    writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", run.first_index())?;
    for segment in run.segments() {
        writeln!(out, "#EXTINF:{:.6},", segment.duration)?;
        writeln!(out, "{}", segment.file_name())?;
    }
    writeln!(out, "#EXT-X-ENDLIST")?;
    Ok(out)
}

/// Writes the run's playlist into `destination` and returns its path.
pub async fn write_manifest(destination: &Path, run: &PlaylistRun) -> Result<PathBuf> {
    let path = destination.join(manifest_file_name(run));
    let body = render_manifest(run)?;
    tokio::fs::write(&path, body).await?;
    debug!(
        path = %path.display(),
        segments = run.len(),
        "Wrote run playlist"
    );
    Ok(path)
}
