//! Ordered hand-off between segment discovery and download submission.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::segment::Segment;

/// Producer half, owned by the playlist poller.
///
/// Dropping it (the poller reached a terminal state) ends the consumer's sequence
/// once the already queued segments are drained.
#[derive(Debug, Clone)]
pub struct SegmentSender {
    tx: mpsc::UnboundedSender<Segment>,
}

impl SegmentSender {
    /// Queues a segment. Returns `false` when the consumer is gone.
    pub fn push(&self, segment: Segment) -> bool {
        self.tx.send(segment).is_ok()
    }
}

/// Unbounded FIFO of newly discovered segments, consumed once.
#[derive(Debug)]
pub struct SegmentQueue {
    rx: mpsc::UnboundedReceiver<Segment>,
}

impl SegmentQueue {
    pub fn channel() -> (SegmentSender, SegmentQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SegmentSender { tx }, SegmentQueue { rx })
    }

    /// Waits for the next segment.
    ///
    /// While the poller is alive this suspends until it discovers something;
    /// `None` means the poller has stopped and every queued segment was taken.
    pub async fn next_segment(&mut self) -> Option<Segment> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Stream for SegmentQueue {
    type Item = Segment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
