// Playlist poller: refreshes the live playlist on a fixed cadence, records new
// segments in the ledger and hands them to the download queue.

use std::sync::Arc;
use std::time::Instant;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::PollerConfig;
use crate::error::{RecorderError, Result};
use crate::hls::fetcher::{FetchOutcome, ManifestSource};
use crate::hls::playlist::parse_media_playlist;
use crate::hls::queue::SegmentSender;
use crate::ledger::Ledger;
use crate::retry::RetryPolicy;
use crate::segment::Segment;

/// Where the poller stands after a check cycle.
///
/// The fatal state is not represented here: exhausting the retry budget is
/// returned as [`RecorderError::RetryBudgetExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStatus {
    /// Keep refreshing at the normal cadence.
    Polling,
    /// The stream ended (`#EXT-X-ENDLIST` or a sustained 404). Terminal.
    ///
    /// A 404 only ends the stream once the retry counter already sits at
    /// `max_retries`. With `max_retries = N` the first N consecutive 404s back
    /// off and charge the counter up to N, and the poll that sees the N-th
    /// charge in place transitions here: N charged 404s plus the deciding one,
    /// so N + 1 requests in total.
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct PollState {
    pub last_check: Option<Instant>,
    /// Consecutive failed refreshes charged against the retry budget
    pub retry_count: u32,
    pub exhausted: bool,
}

pub struct PlaylistPoller {
    source: Arc<dyn ManifestSource>,
    ledger: Ledger,
    queue: SegmentSender,
    config: PollerConfig,
    backoff: RetryPolicy,
    state: PollState,
    discovered: u64,
    span: Span,
}

impl PlaylistPoller {
    pub fn new(
        source: Arc<dyn ManifestSource>,
        ledger: Ledger,
        queue: SegmentSender,
        config: PollerConfig,
    ) -> Self {
        let backoff = RetryPolicy::seconds(config.max_retries, config.backoff_cap);
        let span = info_span!("poller", url = %source.url());
        Self {
            source,
            ledger,
            queue,
            config,
            backoff,
            state: PollState::default(),
            discovered: 0,
            span,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Segments discovered by this poller, excluding those replayed from the ledger.
    pub fn discovered(&self) -> u64 {
        self.discovered
    }

    /// Refreshes the playlist until the stream ends, the retry budget runs out or
    /// `token` is cancelled. Returns the number of newly discovered segments.
    ///
    /// The queue producer is dropped on return, which ends the consumer's sequence.
    pub async fn run(mut self, token: CancellationToken) -> Result<u64> {
        let span = self.span.clone();
        async move {
            info!(
                interval = ?self.config.poll_interval,
                max_retries = self.config.max_retries,
                "Playlist monitoring started"
            );
            loop {
                let status = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Cancellation token received, stopping playlist monitoring");
                        return Err(RecorderError::Cancelled);
                    }
                    status = self.check() => status?,
                };

                if status == PollerStatus::Exhausted {
                    info!(
                        discovered = self.discovered,
                        recorded = self.ledger.len(),
                        "Playlist exhausted, stopping monitoring"
                    );
                    return Ok(self.discovered);
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Cancellation token received, stopping playlist monitoring");
                        return Err(RecorderError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs one check cycle.
    pub async fn check(&mut self) -> Result<PollerStatus> {
        if self.state.exhausted {
            return Ok(PollerStatus::Exhausted);
        }
        self.state.last_check = Some(Instant::now());

        match self.source.fetch().await {
            FetchOutcome::Timeout => {
                // Slow is not unreachable: no charge against the retry budget.
                warn!(
                    retry_count = self.state.retry_count,
                    "Playlist request timed out"
                );
                Ok(PollerStatus::Polling)
            }
            FetchOutcome::TransportError(e) => {
                warn!(error = %e, "Playlist request failed");
                self.backoff().await
            }
            FetchOutcome::Response { status, body } if status == StatusCode::OK => {
                let snapshot = match parse_media_playlist(&body, self.source.url()) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(error = %e, "Ignoring unparsable playlist");
                        return Ok(PollerStatus::Polling);
                    }
                };

                self.state.retry_count = 0;
                let mut new_segments = 0usize;
                for segment in snapshot.segments {
                    if self.ledger.contains(&segment.url) {
                        continue;
                    }
                    self.insert(segment).await?;
                    new_segments += 1;
                }
                debug!(
                    media_sequence = snapshot.media_sequence,
                    new_segments, "Playlist refreshed"
                );

                if snapshot.end_list {
                    info!("ENDLIST reached");
                    self.state.exhausted = true;
                    return Ok(PollerStatus::Exhausted);
                }
                Ok(PollerStatus::Polling)
            }
            FetchOutcome::Response { status, .. } if status == StatusCode::NOT_FOUND => {
                if self.state.retry_count >= self.config.max_retries {
                    info!(
                        retries = self.state.retry_count,
                        "Playlist gone after repeated 404s, treating as end of stream"
                    );
                    self.state.exhausted = true;
                    return Ok(PollerStatus::Exhausted);
                }
                warn!(%status, "Playlist not found");
                self.backoff().await
            }
            FetchOutcome::Response { status, .. } => {
                warn!(%status, "Unexpected playlist response status");
                self.backoff().await
            }
        }
    }

    async fn backoff(&mut self) -> Result<PollerStatus> {
        if self.state.retry_count >= self.config.max_retries {
            error!(
                retries = self.state.retry_count,
                "Playlist retry budget exhausted"
            );
            return Err(RecorderError::RetryBudgetExhausted {
                retries: self.state.retry_count,
            });
        }

        let delay = self.backoff.delay_for_attempt(self.state.retry_count);
        warn!(
            attempt = self.state.retry_count + 1,
            max = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Backing off before next playlist refresh"
        );
        tokio::time::sleep(delay).await;
        self.state.retry_count += 1;
        Ok(PollerStatus::Polling)
    }

    async fn insert(&mut self, segment: Segment) -> Result<()> {
        if let Some(last) = self.ledger.last_index()
            && segment.index != last + 1
        {
            warn!(
                expected = last + 1,
                actual = segment.index,
                "Segment index out of order"
            );
        }

        let segment = self.ledger.append(segment).await?;
        let index = segment.index;
        if !self.queue.push(segment) {
            return Err(RecorderError::internal("segment queue consumer closed"));
        }
        self.discovered += 1;
        debug!(msn = index, "New segment queued");
        Ok(())
    }
}
