// Segment fetcher: resumable, retried download of a single segment to disk.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, trace};

use crate::config::DownloadConfig;
use crate::error::{RecorderError, Result};
use crate::retry::{RetryAction, RetryExhausted, RetryPolicy, retry_with_backoff};
use crate::segment::Segment;

/// Immutable description of one download, handed to a worker.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub segment: Segment,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(segment: Segment, destination: PathBuf) -> Self {
        Self {
            segment,
            destination,
        }
    }

    pub fn url(&self) -> &str {
        &self.segment.url
    }
}

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// Downloads the task to its destination, retrying transient failures.
    /// Returns the final file size.
    async fn download(&self, task: &DownloadTask) -> std::result::Result<u64, RetryExhausted>;
}

pub struct SegmentFetcher {
    http_client: Client,
    config: DownloadConfig,
    retry_policy: RetryPolicy,
}

impl SegmentFetcher {
    pub fn new(http_client: Client, config: DownloadConfig) -> Self {
        let retry_policy = RetryPolicy::seconds(config.max_retries, config.backoff_cap);
        Self {
            http_client,
            config,
            retry_policy,
        }
    }

    /// One attempt: continue the partial file on disk from its current size.
    async fn fetch_once(&self, task: &DownloadTask) -> Result<u64> {
        let offset = match tokio::fs::metadata(&task.destination).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut request = self
            .http_client
            .get(task.url())
            .timeout(self.config.request_timeout);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let resume = match status {
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::OK => {
                if offset > 0 {
                    debug!(
                        msn = task.segment.index,
                        offset, "Server ignored range request, restarting segment"
                    );
                }
                false
            }
            _ => {
                return Err(RecorderError::http_status(
                    status,
                    task.url(),
                    "segment download",
                ));
            }
        };

        let file = if resume {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&task.destination)
                .await?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&task.destination)
                .await?
        };
        let mut writer = BufWriter::with_capacity(self.config.chunk_size, file);

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_reqwest_error)?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(if resume { offset + written } else { written })
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    #[instrument(skip(self, task), fields(msn = task.segment.index))]
    async fn download(&self, task: &DownloadTask) -> std::result::Result<u64, RetryExhausted> {
        let start = Instant::now();
        let fetcher = self;
        let size = retry_with_backoff(&self.retry_policy, move |_| async move {
            match fetcher.fetch_once(task).await {
                Ok(size) => RetryAction::Success(size),
                Err(e) if e.is_retryable() => RetryAction::Retry(e),
                Err(e) => RetryAction::Fail(e),
            }
        })
        .await?;

        trace!(
            url = %task.url(),
            size,
            latency_ms = start.elapsed().as_millis() as u64,
            "Segment downloaded"
        );
        Ok(size)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> RecorderError {
    if e.is_timeout() {
        RecorderError::Timeout {
            reason: e.to_string(),
        }
    } else if e.is_builder() {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        RecorderError::invalid_url(url, e.to_string())
    } else {
        RecorderError::from(e)
    }
}
