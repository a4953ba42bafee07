//! Live recording: ties the playlist poller, the segment queue and the download
//! pool together for one stream.

use std::sync::Arc;

use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::config::{MIN_TICK_INTERVAL, RecorderConfig};
use crate::download::{DownloadOrchestrator, SegmentDownloader, SegmentFetcher};
use crate::error::{RecorderError, Result};
use crate::hls::{HttpManifestSource, ManifestSource, PlaylistPoller, SegmentQueue};
use crate::ledger::Ledger;

/// Outcome of a recording that ran to the end of the stream.
#[derive(Debug, Clone, Default)]
pub struct RecordingSummary {
    /// Segments newly discovered in this run
    pub discovered: u64,
    pub completed: usize,
    /// Indices of segments that permanently failed
    pub failed: Vec<u64>,
    pub bytes: u64,
}

impl RecordingSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Recorder {
    config: RecorderConfig,
    source: Arc<dyn ManifestSource>,
    downloader: Arc<dyn SegmentDownloader>,
}

impl Recorder {
    /// Recorder fetching `playlist_url` and its segments over HTTP.
    pub fn new(config: RecorderConfig, playlist_url: &str) -> Result<Self> {
        let url = Url::parse(playlist_url)
            .map_err(|e| RecorderError::invalid_url(playlist_url, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RecorderError::invalid_url(
                playlist_url,
                "only http and https playlists are supported",
            ));
        }

        let client = config.http.build_client()?;
        let source = Arc::new(HttpManifestSource::new(
            client.clone(),
            url,
            config.http.params.clone(),
            config.poller.request_timeout,
        ));
        let downloader = Arc::new(SegmentFetcher::new(client, config.download.clone()));
        Ok(Self::with_components(config, source, downloader))
    }

    pub fn with_components(
        config: RecorderConfig,
        source: Arc<dyn ManifestSource>,
        downloader: Arc<dyn SegmentDownloader>,
    ) -> Self {
        Self {
            config,
            source,
            downloader,
        }
    }

    /// Records until the stream ends, then waits for every queued segment.
    ///
    /// Fails when the playlist becomes unreachable for longer than the retry
    /// budget allows or when `token` is cancelled; in both cases in-flight
    /// downloads are abandoned.
    pub async fn run(self, token: CancellationToken) -> Result<RecordingSummary> {
        let span = info_span!(
            "recorder",
            url = %self.source.url(),
            destination = %self.config.destination.display()
        );
        self.record(token).instrument(span).await
    }

    async fn record(self, token: CancellationToken) -> Result<RecordingSummary> {
        let destination = self.config.destination.clone();
        tokio::fs::create_dir_all(&destination).await?;

        let ledger = Ledger::open(&destination).await?;
        let (sender, mut queue) = SegmentQueue::channel();
        let poller = PlaylistPoller::new(
            Arc::clone(&self.source),
            ledger,
            sender,
            self.config.poller.clone(),
        );
        let poller_handle = tokio::spawn(poller.run(token.child_token()));

        let mut pool = DownloadOrchestrator::start(
            Arc::clone(&self.downloader),
            &destination,
            self.config.download.clone(),
        );

        let period = self.config.download.progress_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);

        // Drains the queue until the poller stops and every discovered segment
        // was submitted.
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                segment = queue.next_segment() => match segment {
                    Some(segment) => {
                        if let Err(e) = pool.submit(segment) {
                            error!(error = %e, "Failed to submit segment, aborting recording");
                            poller_handle.abort();
                            pool.abort();
                            return Err(e);
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    pool.report_progress();
                }
            }
        }

        let discovered = match poller_handle.await {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(e)) => {
                if e.is_fatal() {
                    error!(error = %e, "Recording terminated");
                }
                pool.abort();
                return Err(e);
            }
            Err(e) => {
                pool.abort();
                return Err(RecorderError::internal(format!("playlist poller panicked: {e}")));
            }
        };
        if token.is_cancelled() {
            pool.abort();
            return Err(RecorderError::Cancelled);
        }

        info!(discovered, "Stream ended, waiting for outstanding downloads");
        // Dropping the unfinished drain future drops the pool, aborting its workers.
        let summary = tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled while draining downloads, in-flight segments left partial");
                return Err(RecorderError::Cancelled);
            }
            summary = pool.finish() => summary,
        };

        let summary = RecordingSummary {
            discovered,
            completed: summary.completed,
            failed: summary.failed,
            bytes: summary.bytes,
        };
        if summary.is_success() {
            info!(
                completed = summary.completed,
                bytes = summary.bytes,
                "Recording finished"
            );
        } else {
            warn!(
                completed = summary.completed,
                failed = summary.failed.len(),
                "Recording finished with permanently failed segments"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DownloadTask;
    use crate::hls::FetchOutcome;
    use crate::retry::RetryExhausted;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves the scripted responses in order, repeating the last one.
    struct Script {
        url: Url,
        steps: Mutex<Vec<(u16, &'static str)>>,
    }

    impl Script {
        fn new(steps: Vec<(u16, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                url: Url::parse("https://example.com/live/index.m3u8").unwrap(),
                steps: Mutex::new(steps),
            })
        }
    }

    #[async_trait]
    impl ManifestSource for Script {
        fn url(&self) -> &Url {
            &self.url
        }

        async fn fetch(&self) -> FetchOutcome {
            let mut steps = self.steps.lock().unwrap();
            let (status, body) = if steps.len() > 1 {
                steps.remove(0)
            } else {
                steps[0]
            };
            FetchOutcome::Response {
                status: StatusCode::from_u16(status).unwrap(),
                body: Bytes::from_static(body.as_bytes()),
            }
        }
    }

    /// Writes the url as file content; fails indices listed in `fail`.
    struct WriteUrl {
        fail: Vec<u64>,
    }

    #[async_trait]
    impl SegmentDownloader for WriteUrl {
        async fn download(&self, task: &DownloadTask) -> std::result::Result<u64, RetryExhausted> {
            if self.fail.contains(&task.segment.index) {
                return Err(RetryExhausted {
                    attempts: 1,
                    last_error: RecorderError::internal("nope"),
                });
            }
            tokio::fs::write(&task.destination, task.url())
                .await
                .map_err(|e| RetryExhausted {
                    attempts: 1,
                    last_error: e.into(),
                })?;
            Ok(task.url().len() as u64)
        }
    }

    const LIVE: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
        #EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nb.ts\n";
    const ENDED: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
        #EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nb.ts\n#EXTINF:2.0,\nc.ts\n#EXT-X-ENDLIST\n";

    fn config(dir: &std::path::Path) -> RecorderConfig {
        let mut config = RecorderConfig::new(dir);
        config.poller.max_retries = 2;
        config.download.workers = 2;
        config.download.drain_interval = Duration::from_millis(10);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn records_until_endlist_and_waits_for_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::with_components(
            config(dir.path()),
            Script::new(vec![(200, LIVE), (200, ENDED)]),
            Arc::new(WriteUrl { fail: vec![] }),
        );

        let summary = recorder.run(CancellationToken::new()).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.completed, 3);
        for name in ["0000000000_000000.ts", "0000000001_000001.ts", "0000000002_000002.ts"] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_segments_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::with_components(
            config(dir.path()),
            Script::new(vec![(200, ENDED)]),
            Arc::new(WriteUrl { fail: vec![1] }),
        );

        let summary = recorder.run(CancellationToken::new()).await.unwrap();
        assert!(!summary.is_success());
        assert_eq!(summary.failed, vec![1]);
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_intervals_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.download.progress_interval = Duration::ZERO;
        config.download.drain_interval = Duration::ZERO;
        let recorder = Recorder::with_components(
            config,
            Script::new(vec![(200, LIVE), (200, ENDED)]),
            Arc::new(WriteUrl { fail: vec![] }),
        );

        let summary = recorder.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_playlist_terminates_recording() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::with_components(
            config(dir.path()),
            Script::new(vec![(200, LIVE), (500, "")]),
            Arc::new(WriteUrl { fail: vec![] }),
        );

        let err = recorder.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RecorderError::RetryBudgetExhausted { retries: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_recording_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::with_components(
            config(dir.path()),
            Script::new(vec![(200, LIVE)]),
            Arc::new(WriteUrl { fail: vec![] }),
        );

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let err = recorder.run(token).await.unwrap_err();
        assert!(matches!(err, RecorderError::Cancelled));
    }

    #[test]
    fn non_http_playlist_is_rejected() {
        let err = Recorder::new(RecorderConfig::new("/tmp/rec"), "ftp://example.com/a.m3u8")
            .err()
            .unwrap();
        assert!(matches!(err, RecorderError::InvalidUrl { .. }));
    }
}
