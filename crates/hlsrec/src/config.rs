use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::{RecorderError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// HTTP client options shared by the playlist poller and the segment workers.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Query parameters appended to every playlist request
    pub params: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
            params: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }

    /// Builds the shared client. Overall request timeouts are applied per request
    /// by the callers, not here.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let redirect = if self.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .redirect(redirect)
            .build()
            .map_err(RecorderError::from)
    }
}

/// Playlist refresh cadence and its retry budget.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between two playlist checks
    pub poll_interval: Duration,
    /// Hard timeout for one playlist request, body included
    pub request_timeout: Duration,
    /// Consecutive failed refreshes tolerated before the recording is aborted
    pub max_retries: u32,
    /// Upper bound of the exponential backoff delay
    pub backoff_cap: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            max_retries: 5,
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Floor for the periodic progress and drain tickers, which reject a zero period.
pub(crate) const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of download workers (default: 6)
    pub workers: usize,
    /// Overall timeout of a single segment request
    pub request_timeout: Duration,
    /// Retries after the first failed attempt before a segment is given up
    pub max_retries: u32,
    pub backoff_cap: Duration,
    /// Write buffer size used while streaming a segment body to disk
    pub chunk_size: usize,
    /// How often outstanding tasks are classified and reported while recording
    pub progress_interval: Duration,
    /// How often outstanding tasks are checked once the playlist has ended
    pub drain_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            request_timeout: Duration::from_secs(30),
            max_retries: 5,
            backoff_cap: Duration::from_secs(30),
            chunk_size: 64 * 1024, // 64 KB
            progress_interval: Duration::from_secs(5),
            drain_interval: Duration::from_secs(2),
        }
    }
}

/// Options for the offline merge pass.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Output container extension (e.g. "mp4", "mkv", "ts")
    pub extension: String,
    /// Whether to overwrite existing outputs
    pub overwrite: bool,
    /// Remove the segment files of a run once it was remuxed successfully
    pub delete_segments: bool,
    /// Only write the run playlists, never invoke the remuxer
    pub dry_run: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            extension: "mp4".to_string(),
            overwrite: true,
            delete_segments: false,
            dry_run: false,
        }
    }
}

// --- Top-Level Configuration ---
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory holding the ledger, the segment files and the error log
    pub destination: PathBuf,
    pub http: HttpConfig,
    pub poller: PollerConfig,
    pub download: DownloadConfig,
}

impl RecorderConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            http: HttpConfig::default(),
            poller: PollerConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let download = DownloadConfig::default();
        assert_eq!(download.workers, 6);
        assert_eq!(download.chunk_size, 64 * 1024);

        let poller = PollerConfig::default();
        assert_eq!(poller.max_retries, 5);
        assert!(poller.request_timeout > Duration::ZERO);
    }

    #[test]
    fn default_client_builds() {
        assert!(HttpConfig::default().build_client().is_ok());
    }
}
