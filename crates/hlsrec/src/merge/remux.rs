use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::MergeConfig;
use crate::error::{RecorderError, Result};

/// Repackages the segments listed in a local playlist into one container file.
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, playlist: &Path, output: &Path) -> Result<()>;
}

/// Remuxer backed by an ffmpeg subprocess performing a stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    ffmpeg_path: String,
    overwrite: bool,
}

impl FfmpegRemuxer {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            overwrite: config.overwrite,
        }
    }

    /// Containers that support moving the index to the front of the file.
    fn supports_faststart(output: &Path) -> bool {
        output
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "mp4" | "m4v" | "mov" | "m4a"
                )
            })
            .unwrap_or(false)
    }

    fn build_args(&self, playlist: &Path, output: &Path) -> Vec<String> {
        let mut args = Vec::new();

        args.push(if self.overwrite { "-y" } else { "-n" }.to_string());
        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());
        args.extend(["-loglevel".to_string(), "error".to_string()]);

        args.extend(["-f".to_string(), "hls".to_string()]);
        args.extend(["-allowed_extensions".to_string(), "ALL".to_string()]);
        args.extend(["-i".to_string(), playlist.to_string_lossy().into_owned()]);

        args.extend(["-map".to_string(), "0".to_string()]);
        args.extend(["-c".to_string(), "copy".to_string()]);
        if Self::supports_faststart(output) {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, playlist: &Path, output: &Path) -> Result<()> {
        let args = self.build_args(playlist, output);
        debug!("FFmpeg args: {:?}", args);

        let start = Instant::now();
        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RecorderError::internal(format!(
                    "failed to spawn `{}`: {}",
                    self.ffmpeg_path, e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("unknown ffmpeg error");
            return Err(RecorderError::internal(format!(
                "ffmpeg failed with exit code {}: {}",
                result.status.code().unwrap_or(-1),
                message
            )));
        }

        info!(
            output = %output.display(),
            "Remux completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
